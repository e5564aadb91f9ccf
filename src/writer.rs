//! Output file shared by all workers.
//!
//! Workers write through positional I/O (`pwrite` on Unix, `seek_write` on
//! Windows) so they never share a cursor and never need a lock. Callers must keep
//! their regions disjoint; the writer does not check for overlap.
use bytes::Bytes;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DestinationWriter {
    file: Arc<File>,
    path: PathBuf,
}

impl DestinationWriter {
    /// Creates (or truncates) `path` and pre-sizes it to `len` bytes.
    pub async fn create(path: impl AsRef<Path>, len: u64) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let file = tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&open_path)?;
            // Pre-allocate so positional writes past the current end don't fragment.
            file.set_len(len)?;
            Ok::<_, io::Error>(file)
        })
        .await
        .map_err(io::Error::other)??;

        Ok(Self {
            file: Arc::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes all of `data` at `offset` and returns the number of bytes written.
    pub async fn write_at(&self, offset: u64, data: Bytes) -> io::Result<usize> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || {
            write_all_at(&file, &data, offset)?;
            Ok(data.len())
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Flushes file contents to stable storage. The writer is unusable afterwards.
    pub async fn close(self) -> io::Result<()> {
        let file = self.file;
        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(io::Error::other)?
    }
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ));
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
