//! One-shot user messages carried across a redirect in a cookie.

use data_encoding::BASE64URL_NOPAD;
use serde::{Deserialize, Serialize};

pub const COOKIE: &str = "flash";

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Flash {
    pub level: Level,
    pub text: String,
}

impl Flash {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            text: text.into(),
        }
    }
}

pub fn encode(messages: &[Flash]) -> String {
    let json = serde_json::to_vec(messages).unwrap_or_default();
    BASE64URL_NOPAD.encode(&json)
}

/// Anything unreadable decodes to no messages.
pub fn decode(cookie: &str) -> Vec<Flash> {
    BASE64URL_NOPAD
        .decode(cookie.as_bytes())
        .ok()
        .and_then(|json| serde_json::from_slice(&json).ok())
        .unwrap_or_default()
}

pub fn set_cookie(messages: &[Flash]) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", COOKIE, encode(messages))
}

pub fn clear_cookie() -> String {
    format!("{}=; Path=/; Max-Age=0", COOKIE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let messages = vec![
            Flash::success("Destination added and data sent successfully."),
            Flash::error("Error: 500 - <h1>boom</h1>; path=/"),
        ];
        let cookie = encode(&messages);
        assert!(!cookie.contains(';'));
        assert!(!cookie.contains('='));
        assert_eq!(decode(&cookie), messages);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode("not base64 !!").is_empty());
        assert!(decode("").is_empty());
        assert!(decode(&BASE64URL_NOPAD.encode(b"{not json")).is_empty());
    }

    #[test]
    fn test_level_json() {
        let json = serde_json::to_value(Flash::error("x")).unwrap();
        assert_eq!(json, serde_json::json!({"level": "error", "text": "x"}));
    }
}
