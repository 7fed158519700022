//! Opaque pagination cursors.
//!
//! A cursor is the store's native continuation token, base64url encoded
//! without padding. Encoding is the only transform: the token text comes
//! back byte-for-byte on decode.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::core::{NoSqlError, Result};

/// Wrap a native token. An absent token means there are no more pages.
#[must_use]
pub fn encode(native: Option<&str>) -> Option<String> {
    native.map(|token| URL_SAFE_NO_PAD.encode(token.as_bytes()))
}

/// Recover the native token from a cursor string
pub fn decode(cursor: &str) -> Result<String> {
    if cursor.is_empty() {
        return Err(NoSqlError::InvalidCursor("cursor is empty".into()));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|e| NoSqlError::InvalidCursor(format!("not base64url: {}", e)))?;

    String::from_utf8(bytes)
        .map_err(|_| NoSqlError::InvalidCursor("token is not valid UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;

    #[test]
    fn test_absent_token() {
        assert_eq!(encode(None), None);
    }

    #[test]
    fn test_roundtrip_json_token() {
        let token = r#"{"id":{"S":"user-42"}}"#;
        let cursor = encode(Some(token)).unwrap();
        assert!(!cursor.contains('='));
        assert_eq!(decode(&cursor).unwrap(), token);
    }

    #[test]
    fn test_malformed_cursors() {
        assert_eq!(decode("").unwrap_err().kind(), ErrorKind::InvalidCursor);
        assert_eq!(decode("not a cursor!").unwrap_err().kind(), ErrorKind::InvalidCursor);
        // 0xff 0xfe is not UTF-8
        assert_eq!(decode("__4").unwrap_err().kind(), ErrorKind::InvalidCursor);
    }
}
