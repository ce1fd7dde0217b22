//! Request bodies for uploads

use bytes::{Bytes, BytesMut};
use futures::{stream, Stream, StreamExt, TryStreamExt};
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full, StreamBody};
use hyper::body::Frame;
use std::io;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Read size for file streaming
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Body type for every request the client sends
pub type UploadBody = UnsyncBoxBody<Bytes, io::Error>;

/// Stream a file in chunks of at most `chunk_size` bytes
pub fn file_stream(
    file: File,
    chunk_size: usize,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    stream::try_unfold(file, move |mut file| async move {
        let mut buf = BytesMut::with_capacity(chunk_size);
        let n = file.read_buf(&mut buf).await?;
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some((buf.freeze(), file)))
        }
    })
}

/// Body backed by a byte stream
pub fn streamed<S>(stream: S) -> UploadBody
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync()
}

/// Body from bytes already in memory
pub fn full(data: impl Into<Bytes>) -> UploadBody {
    Full::new(data.into()).map_err(|never| match never {}).boxed_unsync()
}

/// `head`, then the file contents, then `tail`
pub fn framed_file(head: Bytes, file: File, tail: Bytes) -> UploadBody {
    let body = stream::once(async move { Ok(head) })
        .chain(file_stream(file, CHUNK_SIZE))
        .chain(stream::once(async move { Ok(tail) }));
    streamed(body)
}
