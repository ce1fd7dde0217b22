//! HTTP client for a filedrop server

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client as HttpClient};
use hyper_util::rt::TokioExecutor;
use std::path::Path;
use tokio::fs::File;
use tracing::{debug, info};

use crate::multipart::FormUpload;
use crate::streaming::{file_stream, framed_file, full, streamed, UploadBody, CHUNK_SIZE};
use crate::{ClientError, Result};

/// Header naming the destination in raw-body uploads
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// filedrop client
#[derive(Clone)]
pub struct Client {
    base_url: String,
    http: HttpClient<HttpConnector, UploadBody>,
}

impl Client {
    /// Create a client for the server at `base_url`, e.g. `http://127.0.0.1:8080`
    pub fn new(base_url: &str) -> Result<Self> {
        let uri: Uri = base_url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| ClientError::InvalidUrl(e.to_string()))?;
        if uri.scheme_str() != Some("http") || uri.authority().is_none() {
            return Err(ClientError::InvalidUrl(format!(
                "expected http://host:port, got {}",
                base_url
            )));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: HttpClient::builder(TokioExecutor::new()).build_http(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upload a file from disk as multipart form data, declaring its size.
    ///
    /// Returns the number of content bytes sent.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let (file, name, len) = open_upload(path).await?;

        let form = FormUpload::new(name).with_length(len);
        let body_len = form.encoded_len(len);
        let body = framed_file(form.head(), file, form.tail());

        info!("Sending {} ({} bytes)", path.display(), len);
        self.post_form(&form, body, body_len).await?;
        Ok(len)
    }

    /// Upload in-memory content as multipart form data, declaring its size
    pub async fn send_bytes(&self, file_name: &str, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        let form = FormUpload::new(file_name).with_length(data.len() as u64);
        self.send_form(&form, &data).await
    }

    /// Upload `content` framed exactly as `form` describes
    pub async fn send_form(&self, form: &FormUpload, content: &[u8]) -> Result<()> {
        let encoded = form.encode(content);
        let len = encoded.len() as u64;
        self.post_form(form, full(encoded), len).await
    }

    /// Upload in-memory content as a raw body named by the file name header
    pub async fn send_raw(&self, file_name: &str, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        let len = data.len() as u64;
        self.post_raw(file_name, full(data), len).await
    }

    /// Upload a file from disk as a raw body
    pub async fn send_raw_file(&self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let (file, name, len) = open_upload(path).await?;

        info!("Sending {} raw ({} bytes)", path.display(), len);
        self.post_raw(&name, streamed(file_stream(file, CHUNK_SIZE)), len).await?;
        Ok(len)
    }

    /// Fetch the server's health document
    pub async fn health(&self) -> Result<serde_json::Value> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(self.url("/health")?)
            .body(full(Bytes::new()))
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        let body = self.execute(request).await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    async fn post_form(&self, form: &FormUpload, body: UploadBody, body_len: u64) -> Result<()> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.url("/send")?)
            .header(CONTENT_TYPE, form.content_type())
            .header(CONTENT_LENGTH, body_len)
            .body(body)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        self.execute(request).await.map(drop)
    }

    async fn post_raw(&self, file_name: &str, body: UploadBody, len: u64) -> Result<()> {
        let name = HeaderValue::from_bytes(file_name.as_bytes()).map_err(|_| {
            let reason = format!("file name {:?} is not a valid header value", file_name);
            ClientError::InvalidFile(reason)
        })?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.url("/send")?)
            .header(FILE_NAME_HEADER, name)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, len)
            .body(body)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        self.execute(request).await.map(drop)
    }

    /// Send `request` and return the body of a 200 response
    async fn execute(&self, request: Request<UploadBody>) -> Result<Bytes> {
        debug!("{} {}", request.method(), request.uri());
        let response = self
            .http
            .request(request)
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?
            .to_bytes();

        if status != StatusCode::OK {
            return Err(ClientError::Status(status.as_u16()));
        }
        Ok(body)
    }

    fn url(&self, path: &str) -> Result<Uri> {
        format!("{}{}", self.base_url, path)
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| ClientError::InvalidUrl(e.to_string()))
    }
}

async fn open_upload(path: &Path) -> Result<(File, String, u64)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            ClientError::InvalidFile(format!("no usable file name in {}", path.display()))
        })?
        .to_string();

    let file = File::open(path).await?;
    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(ClientError::InvalidFile(format!("{} is not a regular file", path.display())));
    }

    Ok((file, name, metadata.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_validation() {
        let client = Client::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8080");
        assert_eq!(client.url("/send").unwrap().path(), "/send");

        assert!(matches!(Client::new("127.0.0.1:8080"), Err(ClientError::InvalidUrl(_))));
        assert!(matches!(Client::new("https://example.com"), Err(ClientError::InvalidUrl(_))));
        assert!(matches!(Client::new("http://bad host"), Err(ClientError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_open_upload_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_upload(dir.path()).await;
        assert!(matches!(result, Err(ClientError::InvalidFile(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::new(&format!("http://{}", addr)).unwrap();
        let result = client.send_bytes("a.bin", &b"abc"[..]).await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }
}
