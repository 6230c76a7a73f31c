//! JSON representation of a destination, shared by the REST endpoints and the API client.

use serde::{Deserialize, Serialize};

use crate::{model, validate::RawDestination};

/// Public URL prefix for stored media.
pub const MEDIA_URL: &str = "/media/";

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DestinationWire {
    pub id: i64,
    pub place_name: String,
    pub weather: String,
    pub state: String,
    pub district: String,
    pub google_map_link: String,
    pub image: Option<String>,
    pub description: String,
}

/// Outbound request body: every field but the id.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DestinationPayload {
    pub place_name: String,
    pub weather: String,
    pub state: String,
    pub district: String,
    pub google_map_link: String,
    pub image: Option<String>,
    pub description: String,
}

pub fn image_url(reference: &str) -> String {
    format!("{MEDIA_URL}{reference}")
}

/// Strip the media prefix so either a reference or its URL is accepted.
pub fn image_reference(value: &str) -> String {
    value.strip_prefix(MEDIA_URL).unwrap_or(value).to_string()
}

pub fn to_wire(destination: &model::Destination) -> DestinationWire {
    DestinationWire {
        id: destination.id,
        place_name: destination.place_name.clone(),
        weather: destination.weather.clone(),
        state: destination.state.clone(),
        district: destination.district.clone(),
        google_map_link: destination.google_map_link.clone(),
        image: destination.image.as_deref().map(image_url),
        description: destination.description.clone(),
    }
}

impl From<&model::DestinationFields> for DestinationPayload {
    fn from(fields: &model::DestinationFields) -> Self {
        Self {
            place_name: fields.place_name.clone(),
            weather: fields.weather.clone(),
            state: fields.state.clone(),
            district: fields.district.clone(),
            google_map_link: fields.google_map_link.clone(),
            image: fields.image.as_deref().map(image_url),
            description: fields.description.clone(),
        }
    }
}

/// Inbound API bodies are parsed leniently and then validated.
pub fn raw_from_json(mut raw: RawDestination) -> RawDestination {
    raw.image = raw.image.as_deref().map(image_reference);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn munnar(image: Option<&str>) -> model::Destination {
        model::Destination {
            id: 7,
            place_name: "Munnar".to_string(),
            weather: "Misty".to_string(),
            state: "Kerala".to_string(),
            district: "Idukki".to_string(),
            google_map_link: "https://maps.example/munnar".to_string(),
            image: image.map(str::to_string),
            description: "Tea gardens.".to_string(),
        }
    }

    #[test]
    fn test_wire_keys() {
        let json = serde_json::to_value(to_wire(&munnar(Some("destinations/a.jpg")))).unwrap();
        let object = json.as_object().unwrap();
        let mut keys: Vec<&String> = object.keys().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "description",
                "district",
                "google_map_link",
                "id",
                "image",
                "place_name",
                "state",
                "weather"
            ]
        );
        assert_eq!(json["image"], "/media/destinations/a.jpg");
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn test_raw_from_json_strips_media_prefix() {
        let raw: RawDestination =
            serde_json::from_str(r#"{"place_name": "Munnar", "image": "/media/destinations/a.jpg"}"#).unwrap();
        let raw = raw_from_json(raw);
        assert_eq!(raw.image.as_deref(), Some("destinations/a.jpg"));
        assert!(raw.weather.is_none());
    }
}
