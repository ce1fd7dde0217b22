//! Declared length field parsing

use bytes::BytesMut;
use thiserror::Error;

/// Longest `length` field value we are willing to buffer.
pub const MAX_LENGTH_FIELD: usize = 64;

/// Why a declared length was rejected. Never fatal to the upload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LengthError {
    #[error("'{0}' is not a decimal integer")]
    NotANumber(String),

    #[error("declared length {0} is negative")]
    Negative(String),

    #[error("length field exceeds {MAX_LENGTH_FIELD} bytes")]
    TooLong,
}

/// Parse already collected field content as a non-negative decimal integer.
pub fn parse_length(content: &[u8]) -> Result<u64, LengthError> {
    if content.len() > MAX_LENGTH_FIELD {
        return Err(LengthError::TooLong);
    }

    let text = std::str::from_utf8(content)
        .map_err(|_| LengthError::NotANumber(String::from_utf8_lossy(content).into_owned()))?
        .trim();

    match text.parse::<u64>() {
        Ok(n) => Ok(n),
        Err(_) if is_negative_integer(text) => Err(LengthError::Negative(text.to_string())),
        Err(_) => Err(LengthError::NotANumber(text.to_string())),
    }
}

fn is_negative_integer(text: &str) -> bool {
    match text.strip_prefix('-') {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Read a `length` part to completion and parse it.
///
/// The outer error is a body read failure, which the caller classifies like
/// any other part read error; the inner one is the non-fatal parse result.
pub async fn read_length(
    field: &mut multer::Field<'_>,
) -> multer::Result<Result<u64, LengthError>> {
    let mut buf = BytesMut::new();
    let mut overflow = false;

    while let Some(chunk) = field.chunk().await? {
        if overflow {
            continue;
        }
        if buf.len() + chunk.len() > MAX_LENGTH_FIELD {
            overflow = true;
            buf.clear();
            continue;
        }
        buf.extend_from_slice(&chunk);
    }

    if overflow {
        return Ok(Err(LengthError::TooLong));
    }
    Ok(parse_length(&buf))
}
