//! Destination files for uploads

use filedrop_core::{FileDropError, FileName, Result};
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// What to do when the destination already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Truncate and replace the existing file.
    #[default]
    Overwrite,
    /// Refuse to touch an existing file.
    Reject,
}

/// Opens destination files inside one base directory
#[derive(Debug, Clone)]
pub struct SinkFactory {
    base_dir: PathBuf,
    overwrite: OverwritePolicy,
}

impl SinkFactory {
    pub fn new(base_dir: impl Into<PathBuf>, overwrite: OverwritePolicy) -> Self {
        SinkFactory {
            base_dir: base_dir.into(),
            overwrite,
        }
    }

    /// Full path a file name resolves to
    pub fn path_for(&self, name: &FileName) -> PathBuf {
        self.base_dir.join(name.as_str())
    }

    /// Open a new destination for `name`
    pub async fn create(&self, name: &FileName) -> Result<FileSink> {
        let path = self.path_for(name);
        let mut options = OpenOptions::new();
        options.write(true);
        match self.overwrite {
            OverwritePolicy::Overwrite => options.create(true).truncate(true),
            OverwritePolicy::Reject => options.create_new(true),
        };

        let file = options
            .open(&path)
            .await
            .map_err(|source| FileDropError::CreateDestination {
                name: name.to_string(),
                source,
            })?;

        debug!("Opened destination {}", path.display());
        Ok(FileSink { file })
    }

    /// Remove a partially written destination
    pub async fn discard(&self, name: &FileName) {
        let path = self.path_for(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed partial file {}", path.display()),
            Err(e) => warn!("Failed to remove partial file {}: {}", path.display(), e),
        }
    }
}

/// An open destination file. Closed when dropped.
///
/// Writes complete once tokio's file buffer has taken the bytes, so reported
/// progress can lead the disk by one buffer. A failed background write
/// surfaces from the next write or from [`close`](Self::close).
#[derive(Debug)]
pub struct FileSink {
    file: File,
}

impl FileSink {
    /// Flush pending writes and close the file
    pub async fn close(mut self) -> Result<()> {
        self.file.flush().await.map_err(FileDropError::Write)?;
        self.file.shutdown().await.map_err(FileDropError::Write)?;
        Ok(())
    }
}

impl AsyncWrite for FileSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.file).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}
