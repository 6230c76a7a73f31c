use std::collections::BTreeMap;

use serde::Serialize;

/// Storage failures.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("destination {0} not found")]
    NotFound(i64),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("outbox body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-field validation problems, serialized as `{"field": ["message", ..]}`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, thiserror::Error)]
#[serde(transparent)]
#[error("invalid fields: {}", .0.keys().cloned().collect::<Vec<_>>().join(", "))]
pub struct ValidationError(BTreeMap<String, Vec<String>>);

impl ValidationError {
    pub fn add(&mut self, field: &str, message: &str) {
        self.0.entry(field.to_string()).or_default().push(message.to_string());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> Vec<String> {
        self.0.get(field).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Failure of a call against the REST API. The display text is what users see.
#[derive(Debug, thiserror::Error)]
pub enum RemoteCallError {
    #[error("Error during API request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Error: {status} - {body}")]
    Status { status: u16, body: String },
    #[error("Error during API request: invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("Error during API request: unexpected body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RemoteCallError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Failures while accepting an uploaded image.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("image exceeds {max} bytes")]
    TooLarge { max: usize },
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),
    #[error("storing image: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_json() {
        let mut errors = ValidationError::default();
        errors.add("weather", "This field is required.");
        errors.add("google_map_link", "Enter a valid URL.");
        errors.add("google_map_link", "second");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "google_map_link": ["Enter a valid URL.", "second"],
                "weather": ["This field is required."],
            })
        );
        assert_eq!(errors.to_string(), "invalid fields: google_map_link, weather");
    }

    #[test]
    fn test_remote_status_message() {
        let e = RemoteCallError::Status {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(e.to_string(), "Error: 500 - boom");
        assert_eq!(e.status(), Some(500));
    }
}
