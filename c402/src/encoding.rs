//! Base64 JSON header encoding.
//!
//! x402 carries its messages in HTTP headers as standard-alphabet base64 of
//! the JSON document. Decoding is tolerant of surrounding whitespace only.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Failure to turn a header value back into a typed message.
#[derive(Debug, thiserror::Error)]
pub enum HeaderDecodeError {
    /// The header is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not the expected JSON document.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializes `value` to JSON and base64-encodes it for use as a header value.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if serialization fails.
pub fn encode_header<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(b64.encode(json))
}

/// Base64-decodes a header value into raw bytes.
///
/// # Errors
///
/// Returns [`HeaderDecodeError::Base64`] if the value is not valid base64.
pub fn decode_header_bytes(header_value: &str) -> Result<Vec<u8>, HeaderDecodeError> {
    Ok(b64.decode(header_value.trim())?)
}

/// Base64-decodes a header value and parses the JSON into `T`.
///
/// # Errors
///
/// Returns [`HeaderDecodeError`] on base64 or JSON decode failure.
pub fn decode_header<T: DeserializeOwned>(header_value: &str) -> Result<T, HeaderDecodeError> {
    let bytes = decode_header_bytes(header_value)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_trims_whitespace() {
        let encoded = encode_header(&serde_json::json!({"orderId": "ord_1"})).unwrap();
        let value: serde_json::Value = decode_header(&format!("  {encoded}\n")).unwrap();
        assert_eq!(value["orderId"], "ord_1");
    }

    #[test]
    fn test_decode_rejects_non_base64() {
        let err = decode_header::<serde_json::Value>("not base64!!").unwrap_err();
        assert!(matches!(err, HeaderDecodeError::Base64(_)));
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let encoded = b64.encode("plain text");
        let err = decode_header::<serde_json::Value>(&encoded).unwrap_err();
        assert!(matches!(err, HeaderDecodeError::Json(_)));
    }
}
