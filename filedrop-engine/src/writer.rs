//! Progress-instrumented writer

use pin_project::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

use crate::progress::ProgressHandle;

/// Wraps a sink and reports the running byte count after every write.
///
/// The inner write happens first, so reported progress never runs ahead of
/// what the sink accepted. Only the count the sink actually took is added.
#[pin_project]
pub struct ProgressWriter<W> {
    #[pin]
    inner: W,
    progress: ProgressHandle,
    bytes_written: u64,
}

impl<W: AsyncWrite> ProgressWriter<W> {
    pub fn new(inner: W, progress: ProgressHandle) -> Self {
        ProgressWriter {
            inner,
            progress,
            bytes_written: 0,
        }
    }

    /// Bytes accepted by the inner sink so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Split into the inner sink and the progress handle
    pub fn into_parts(self) -> (W, ProgressHandle) {
        (self.inner, self.progress)
    }
}

impl<W: AsyncWrite> AsyncWrite for ProgressWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        match this.inner.poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                *this.bytes_written += n as u64;
                this.progress.report(*this.bytes_written);
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ChannelObserver, ProgressEvent, ProgressRegistry};
    use filedrop_core::{FileName, NamePolicy};
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;

    fn name(s: &str) -> FileName {
        FileName::new(s, NamePolicy::Permissive).unwrap()
    }

    /// Accepts at most `max` bytes per write, then fails after `fail_after` bytes
    struct ChokedSink {
        data: Vec<u8>,
        max: usize,
        fail_after: Option<usize>,
    }

    impl AsyncWrite for ChokedSink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if let Some(limit) = self.fail_after {
                if self.data.len() >= limit {
                    return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk full")));
                }
            }
            let n = buf.len().min(self.max);
            self.data.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn progress_values(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<u64> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|e| match e {
                ProgressEvent::Progress { observation, .. } => Some(observation.bytes_written),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_partial_writes_count_only_accepted_bytes() {
        let (observer, mut rx) = ChannelObserver::new();
        let registry = ProgressRegistry::new(Arc::new(observer));
        let handle = registry.register(name("p.bin"), Some(10));

        let sink = ChokedSink { data: Vec::new(), max: 3, fail_after: None };
        let mut writer = ProgressWriter::new(sink, handle);

        let n = writer.write(b"0123456789").await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(writer.bytes_written(), 3);

        writer.write_all(b"3456789").await.unwrap();
        assert_eq!(writer.bytes_written(), 10);
        assert_eq!(writer.get_ref().data, b"0123456789");

        assert_eq!(progress_values(&mut rx), vec![3, 6, 9, 10]);
    }

    #[tokio::test]
    async fn test_sink_error_propagates_unchanged() {
        let registry = ProgressRegistry::silent();
        let handle = registry.register(name("e.bin"), None);

        let sink = ChokedSink { data: Vec::new(), max: 4, fail_after: Some(4) };
        let mut writer = ProgressWriter::new(sink, handle);

        let err = writer.write_all(b"abcdefgh").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(writer.bytes_written(), 4);
    }

    #[tokio::test]
    async fn test_no_write_no_report() {
        let (observer, mut rx) = ChannelObserver::new();
        let registry = ProgressRegistry::new(Arc::new(observer));
        let handle = registry.register(name("z.bin"), None);

        let mut writer = ProgressWriter::new(Vec::<u8>::new(), handle);
        writer.flush().await.unwrap();
        assert_eq!(writer.bytes_written(), 0);
        assert!(progress_values(&mut rx).is_empty());
    }
}
