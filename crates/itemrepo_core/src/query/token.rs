//! Continuation token codec.
//!
//! This module owns the opaque token format handed to callers. It knows
//! nothing about how a backend encodes its own resume position.

use crate::error::QueryError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

const TOKEN_VERSION: u8 = 1;
// Decode bound for untrusted token input.
const MAX_TOKEN_LEN: usize = 8 * 1024;

/// Decoded continuation token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CursorToken {
    #[serde(rename = "v")]
    pub version: u8,
    /// Page that was returned together with this token.
    #[serde(rename = "p")]
    pub page: u32,
    #[serde(rename = "s")]
    pub page_size: u32,
    /// Fingerprint of the chain shape the token was issued for.
    #[serde(rename = "h")]
    pub shape: u64,
    /// Backend-defined resume position.
    #[serde(rename = "c")]
    pub position: String,
}

impl CursorToken {
    pub(crate) fn new(page: u32, page_size: u32, shape: u64, position: String) -> Self {
        Self {
            version: TOKEN_VERSION,
            page,
            page_size,
            shape,
            position,
        }
    }

    pub(crate) fn encode(&self) -> String {
        // Serializing a plain struct of scalars cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub(crate) fn decode(token: &str) -> Result<Self, QueryError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(QueryError::MalformedToken("token is empty".to_string()));
        }
        if token.len() > MAX_TOKEN_LEN {
            return Err(QueryError::MalformedToken(format!(
                "token exceeds {MAX_TOKEN_LEN} characters"
            )));
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|err| QueryError::MalformedToken(format!("invalid encoding: {err}")))?;
        let decoded: Self = serde_json::from_slice(&bytes)
            .map_err(|err| QueryError::MalformedToken(format!("invalid payload: {err}")))?;
        if decoded.version != TOKEN_VERSION {
            return Err(QueryError::MalformedToken(format!(
                "unsupported token version {}",
                decoded.version
            )));
        }
        Ok(decoded)
    }

    /// Whether this token positions the cursor right before `page_number`
    /// for pages of `page_size` items.
    pub(crate) fn resumes(&self, page_number: u32, page_size: u32) -> bool {
        self.page_size == page_size && self.page.checked_add(1) == Some(page_number)
    }
}

#[cfg(test)]
mod tests {
    use super::{CursorToken, MAX_TOKEN_LEN};
    use crate::error::QueryError;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    #[test]
    fn encoded_token_decodes_to_same_fields() {
        let token = CursorToken::new(3, 25, 0xfeed_beef, "pos-7".to_string());
        let encoded = token.encode();
        assert!(!encoded.contains('='));
        assert_eq!(CursorToken::decode(&encoded).unwrap(), token);
    }

    #[test]
    fn decode_rejects_garbage() {
        for bad in ["", "   ", "%%%", "bm90LWpzb24"] {
            let err = CursorToken::decode(bad).unwrap_err();
            assert!(matches!(err, QueryError::MalformedToken(_)), "{bad}: {err:?}");
        }

        let oversized = "a".repeat(MAX_TOKEN_LEN + 1);
        assert!(CursorToken::decode(&oversized).is_err());
    }

    #[test]
    fn decode_rejects_unknown_versions() {
        let payload = r#"{"v":9,"p":1,"s":2,"h":3,"c":"x"}"#;
        let encoded = URL_SAFE_NO_PAD.encode(payload);
        let err = CursorToken::decode(&encoded).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn resumes_only_the_following_page_with_same_size() {
        let token = CursorToken::new(2, 10, 1, String::new());
        assert!(token.resumes(3, 10));
        assert!(!token.resumes(4, 10));
        assert!(!token.resumes(2, 10));
        assert!(!token.resumes(3, 5));
    }
}
