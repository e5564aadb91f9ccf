//! Splits a file into one contiguous byte range per worker.
use crate::error::DownloadError;
use crate::state::ByteRange;

/// Divides `total_size` bytes into `workers` contiguous half-open ranges.
///
/// Every range gets `total_size / workers` bytes and the last one also absorbs the
/// remainder, so the ranges are sorted, gapless and cover exactly `[0, total_size)`.
/// When there are more workers than bytes the leading ranges are empty.
///
/// # Errors
///
/// Returns [`DownloadError::InvalidPlan`] if `workers` is zero or the file is empty.
pub fn plan(total_size: u64, workers: usize) -> Result<Vec<ByteRange>, DownloadError> {
    if workers == 0 || total_size == 0 {
        return Err(DownloadError::InvalidPlan {
            total_size,
            workers,
        });
    }

    let n = workers as u64;
    let base = total_size / n;

    let ranges = (0..n)
        .map(|i| {
            let start = i * base;
            let end = if i == n - 1 { total_size } else { start + base };
            ByteRange {
                index: i as usize,
                start,
                end,
            }
        })
        .collect();

    Ok(ranges)
}
