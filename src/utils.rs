//! Small helpers for naming output files and formatting sizes for humans.
use percent_encoding::percent_decode_str;
use sanitize_filename::sanitize;
use std::time::Duration;
use url::Url;

/// Name used when the URL path does not end in a usable file name.
pub const FALLBACK_FILE_NAME: &str = "output.bin";

/// Extracts a clean file name from a URL.
///
/// Takes the last path segment, percent-decodes it and strips characters the
/// local filesystem would reject. Query strings and fragments are ignored.
pub fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().to_string())
        .map(sanitize)
        .filter(|s| !s.is_empty() && s != "." && s != "..")
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Same as [`file_name_from_url`] for an unparsed string.
pub fn file_name_from_str(url: &str) -> String {
    Url::parse(url)
        .map(|u| file_name_from_url(&u))
        .unwrap_or_else(|_| FALLBACK_FILE_NAME.to_string())
}

/// Formats a byte count with binary units, e.g. `1.50 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

pub fn format_rate(bytes_per_sec: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}

/// Rounds to whole milliseconds for log and summary output.
pub fn round_millis(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}
