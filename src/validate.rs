//! Field validation shared by the REST endpoints and the HTML forms.
//!
//! Every write path funnels its raw input through [`validate`] so create,
//! update and partial update all enforce the same rules.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{error::ValidationError, model};

pub const MAX_SHORT_TEXT: usize = 255;
pub const MAX_URL: usize = 2048;
pub const MAX_DESCRIPTION: usize = 10_000;
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

const REQUIRED: &str = "This field is required.";
const INVALID_URL: &str = "Enter a valid URL.";
const INVALID_IMAGE: &str = "Enter a valid image reference.";

static IMAGE_REFERENCE: OnceLock<Regex> = OnceLock::new();

/// Unvalidated field values, as they arrive from a form or a JSON body.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RawDestination {
    #[serde(default)]
    pub place_name: Option<String>,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub google_map_link: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl RawDestination {
    /// Fill every absent key from `existing`, used for partial updates.
    pub fn merged_over(self, existing: &model::Destination) -> Self {
        Self {
            place_name: self.place_name.or_else(|| Some(existing.place_name.clone())),
            weather: self.weather.or_else(|| Some(existing.weather.clone())),
            state: self.state.or_else(|| Some(existing.state.clone())),
            district: self.district.or_else(|| Some(existing.district.clone())),
            google_map_link: self.google_map_link.or_else(|| Some(existing.google_map_link.clone())),
            image: self.image.or_else(|| existing.image.clone()),
            description: self.description.or_else(|| Some(existing.description.clone())),
        }
    }
}

impl From<&model::Destination> for RawDestination {
    fn from(destination: &model::Destination) -> Self {
        Self {
            place_name: Some(destination.place_name.clone()),
            weather: Some(destination.weather.clone()),
            state: Some(destination.state.clone()),
            district: Some(destination.district.clone()),
            google_map_link: Some(destination.google_map_link.clone()),
            image: destination.image.clone(),
            description: Some(destination.description.clone()),
        }
    }
}

fn text(errors: &mut ValidationError, field: &str, value: Option<String>, max: usize) -> String {
    let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
    if value.is_empty() {
        errors.add(field, REQUIRED);
    } else if value.chars().count() > max {
        errors.add(field, &format!("Ensure this field has no more than {max} characters."));
    }
    value
}

fn map_link(errors: &mut ValidationError, value: Option<String>) -> String {
    let value = text(errors, "google_map_link", value, MAX_URL);
    if value.is_empty() || errors.contains("google_map_link") {
        return value;
    }
    match url::Url::parse(&value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => value,
        _ => {
            errors.add("google_map_link", INVALID_URL);
            value
        }
    }
}

/// An image reference is a relative path under the media root with a known extension.
pub fn is_image_reference(reference: &str) -> bool {
    let re = IMAGE_REFERENCE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_\-]+(/[A-Za-z0-9_\-]+)*\.(?i:jpg|jpeg|png|gif|webp)$").unwrap()
    });
    re.is_match(reference)
}

fn image(errors: &mut ValidationError, value: Option<String>) -> Option<String> {
    let value = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())?;
    if !is_image_reference(&value) {
        errors.add("image", INVALID_IMAGE);
    }
    Some(value)
}

/// Validate and normalize raw input into storable fields, collecting every problem.
pub fn validate(raw: RawDestination) -> Result<model::DestinationFields, ValidationError> {
    let mut errors = ValidationError::default();
    let fields = model::DestinationFields {
        place_name: text(&mut errors, "place_name", raw.place_name, MAX_SHORT_TEXT),
        weather: text(&mut errors, "weather", raw.weather, MAX_SHORT_TEXT),
        state: text(&mut errors, "state", raw.state, MAX_SHORT_TEXT),
        district: text(&mut errors, "district", raw.district, MAX_SHORT_TEXT),
        google_map_link: map_link(&mut errors, raw.google_map_link),
        image: image(&mut errors, raw.image),
        description: text(&mut errors, "description", raw.description, MAX_DESCRIPTION),
    };

    if errors.is_empty() { Ok(fields) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lakeview() -> RawDestination {
        RawDestination {
            place_name: Some("Lakeview".to_string()),
            weather: Some("Sunny".to_string()),
            state: Some("X".to_string()),
            district: Some("Y".to_string()),
            google_map_link: Some("https://maps.example/1".to_string()),
            image: None,
            description: Some("A lake.".to_string()),
        }
    }

    #[test]
    fn test_valid() {
        let fields = validate(lakeview()).unwrap();
        assert_eq!(fields.place_name, "Lakeview");
        assert_eq!(fields.google_map_link, "https://maps.example/1");
        assert!(fields.image.is_none());
    }

    #[test]
    fn test_trims_whitespace() {
        let mut raw = lakeview();
        raw.place_name = Some("  Lakeview \n".to_string());
        assert_eq!(validate(raw).unwrap().place_name, "Lakeview");
    }

    #[test]
    fn test_missing_fields_are_all_reported() {
        let errors = validate(RawDestination::default()).unwrap_err();
        for field in ["place_name", "weather", "state", "district", "google_map_link", "description"] {
            assert_eq!(errors.messages(field), vec![REQUIRED.to_string()], "{field}");
        }
        assert!(!errors.contains("image"));
    }

    #[test]
    fn test_blank_is_missing() {
        let mut raw = lakeview();
        raw.weather = Some("   ".to_string());
        let errors = validate(raw).unwrap_err();
        assert!(errors.contains("weather"));
    }

    #[test]
    fn test_invalid_url() {
        for link in ["not a url", "maps.example/1", "ftp://maps.example/1", "mailto:a@b.c"] {
            let mut raw = lakeview();
            raw.google_map_link = Some(link.to_string());
            let errors = validate(raw).unwrap_err();
            assert_eq!(errors.messages("google_map_link"), vec![INVALID_URL.to_string()], "{link}");
        }
    }

    #[test]
    fn test_too_long() {
        let mut raw = lakeview();
        raw.state = Some("s".repeat(MAX_SHORT_TEXT + 1));
        let errors = validate(raw).unwrap_err();
        assert!(errors.contains("state"));

        let mut raw = lakeview();
        raw.state = Some("s".repeat(MAX_SHORT_TEXT));
        assert!(validate(raw).is_ok());
    }

    #[test]
    fn test_image_reference() {
        assert!(is_image_reference("destinations/abc123.jpg"));
        assert!(is_image_reference("photo.PNG"));
        assert!(!is_image_reference("../etc/passwd.png"));
        assert!(!is_image_reference("/abs/path.png"));
        assert!(!is_image_reference("destinations/script.js"));

        let mut raw = lakeview();
        raw.image = Some("../secret.png".to_string());
        assert!(validate(raw).unwrap_err().contains("image"));

        let mut raw = lakeview();
        raw.image = Some("".to_string());
        assert!(validate(raw).unwrap().image.is_none());
    }

    #[test]
    fn test_merged_over() {
        let existing = model::Destination::from_fields(4, validate(lakeview()).unwrap());
        let partial = RawDestination {
            weather: Some("Rainy".to_string()),
            ..Default::default()
        };
        let fields = validate(partial.merged_over(&existing)).unwrap();
        assert_eq!(fields.weather, "Rainy");
        assert_eq!(fields.place_name, "Lakeview");
        assert_eq!(fields.description, "A lake.");
    }
}
