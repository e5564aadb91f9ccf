//! Metadata probe against the remote resource.
use crate::error::DownloadError;
use crate::state::ResourceMetadata;
use crate::utils;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap};
use tracing::debug;

/// Fetches size, name and range capability of a URL using a HEAD request.
///
/// No body is transferred and no local state is touched. The suggested file
/// name comes from the final URL after redirects.
///
/// # Errors
///
/// * [`DownloadError::Network`] if the request fails or the status is not a success.
/// * [`DownloadError::UnsupportedRange`] if the server does not advertise `Accept-Ranges: bytes`.
/// * [`DownloadError::Metadata`] if `Content-Length` is missing or not a non-negative integer.
pub async fn probe(client: &reqwest::Client, url: &str) -> Result<ResourceMetadata, DownloadError> {
    let response = client.head(url).send().await?.error_for_status()?;

    let headers = response.headers();
    debug!(status = %response.status(), final_url = %response.url(), "probe response");

    if !accepts_byte_ranges(headers) {
        let advertised = headers
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("<absent>");
        return Err(DownloadError::UnsupportedRange(advertised.to_string()));
    }

    let total_size = content_length(headers)?;

    Ok(ResourceMetadata {
        total_size,
        accepts_ranges: true,
        file_name: utils::file_name_from_url(response.url()),
    })
}

/// True when `Accept-Ranges` lists the `bytes` unit.
fn accepts_byte_ranges(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT_RANGES)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"))
}

/// Reads `Content-Length` from the headers directly.
///
/// `Response::content_length` reflects the body actually sent, which is zero for HEAD.
pub(crate) fn content_length(headers: &HeaderMap) -> Result<u64, DownloadError> {
    let raw = headers
        .get(CONTENT_LENGTH)
        .ok_or_else(|| DownloadError::Metadata("Content-Length not found in response header".into()))?;

    raw.to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| DownloadError::Metadata(format!("unparseable Content-Length {:?}", raw)))
}
