//! multipart/form-data framing for uploads
//!
//! The form always carries the `length` part before the `file` part so the
//! server can size its progress display before any file bytes arrive.

use bytes::{BufMut, Bytes, BytesMut};
use rand::distributions::Alphanumeric;
use rand::Rng;

const BOUNDARY_LEN: usize = 32;

/// Framing for one upload form: an optional `length` part followed by the `file` part
#[derive(Debug, Clone)]
pub struct FormUpload {
    boundary: String,
    file_name: String,
    length: Option<String>,
}

impl FormUpload {
    /// Form without a `length` part
    pub fn new(file_name: impl Into<String>) -> Self {
        let boundary = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(BOUNDARY_LEN)
            .map(char::from)
            .collect();

        Self {
            boundary,
            file_name: file_name.into(),
            length: None,
        }
    }

    /// Declare the file size ahead of the file part
    pub fn with_length(self, length: u64) -> Self {
        self.with_raw_length(length.to_string())
    }

    /// Send `value` verbatim as the `length` part
    pub fn with_raw_length(mut self, value: impl Into<String>) -> Self {
        self.length = Some(value.into());
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Everything up to the first byte of file content
    pub fn head(&self) -> Bytes {
        let mut buf = BytesMut::new();
        if let Some(length) = &self.length {
            buf.put_slice(format!("--{}\r\n", self.boundary).as_bytes());
            buf.put_slice(b"Content-Disposition: form-data; name=\"length\"\r\n\r\n");
            buf.put_slice(length.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(format!("--{}\r\n", self.boundary).as_bytes());
        buf.put_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                escape_quoted(&self.file_name)
            )
            .as_bytes(),
        );
        buf.put_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        buf.freeze()
    }

    /// Closing delimiter after the file content
    pub fn tail(&self) -> Bytes {
        Bytes::from(format!("\r\n--{}--\r\n", self.boundary))
    }

    /// Total body size for `content_len` bytes of file content
    pub fn encoded_len(&self, content_len: u64) -> u64 {
        self.head().len() as u64 + content_len + self.tail().len() as u64
    }

    /// Whole form with `content` in memory
    pub fn encode(&self, content: &[u8]) -> Bytes {
        let head = self.head();
        let tail = self.tail();
        let mut buf = BytesMut::with_capacity(head.len() + content.len() + tail.len());
        buf.put(head);
        buf.put_slice(content);
        buf.put(tail);
        buf.freeze()
    }
}

/// Percent-escape the characters that would end a quoted header parameter
fn escape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("%22"),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_part_precedes_file_part() {
        let form = FormUpload::new("a.bin").with_length(3);
        let body = form.encode(b"xyz");
        let text = String::from_utf8(body.to_vec()).unwrap();

        let length_at = text.find("name=\"length\"").unwrap();
        let file_at = text.find("name=\"file\"").unwrap();
        assert!(length_at < file_at);
        assert!(text.contains("\r\n\r\n3\r\n"));
        assert!(text.contains("\r\n\r\nxyz\r\n"));
        assert!(text.ends_with(&format!("--{}--\r\n", form.boundary())));
        assert_eq!(form.encoded_len(3), body.len() as u64);
    }

    #[test]
    fn test_form_without_length() {
        let form = FormUpload::new("a.bin");
        let text = String::from_utf8(form.head().to_vec()).unwrap();
        assert!(!text.contains("name=\"length\""));
        assert!(text.starts_with(&format!("--{}\r\n", form.boundary())));
    }

    #[test]
    fn test_boundaries_differ() {
        let a = FormUpload::new("a");
        let b = FormUpload::new("a");
        assert_eq!(a.boundary().len(), BOUNDARY_LEN);
        assert_ne!(a.boundary(), b.boundary());
        assert!(a.content_type().ends_with(a.boundary()));
    }

    #[test]
    fn test_file_name_escaping() {
        assert_eq!(escape_quoted("plain.txt"), "plain.txt");
        assert_eq!(escape_quoted("a\"b\r\n.txt"), "a%22b%0D%0A.txt");
    }
}
