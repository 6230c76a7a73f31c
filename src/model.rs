use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Destination is the record stored for each tourist destination.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Destination {
    pub id: i64, // assigned by sqlite, never reused
    pub place_name: String,
    pub weather: String,
    pub state: String,
    pub district: String,
    pub google_map_link: String,
    pub image: Option<String>, // media-relative reference, e.g. destinations/<hash>.jpg
    pub description: String,
}

/// Validated field values for a destination, everything except the id.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DestinationFields {
    pub place_name: String,
    pub weather: String,
    pub state: String,
    pub district: String,
    pub google_map_link: String,
    pub image: Option<String>,
    pub description: String,
}

/// A REST call that mirrors a local write, waiting in the outbox.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PendingCall {
    pub method: String, // POST, PUT or DELETE
    pub path: String,   // relative to the api base url
    pub body: Option<serde_json::Value>,
    /// sent as `Idempotency-Key` so a retried create is applied once
    pub idempotency_key: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct OutboxEntry {
    pub id: i64,
    pub method: String,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
    pub attempts: i64,
    pub last_error: Option<String>,
    /// set while a delivery is in flight
    pub claimed: Option<chrono::DateTime<Utc>>,
    pub created: chrono::DateTime<Utc>,
    pub updated: chrono::DateTime<Utc>,
}

impl OutboxEntry {
    pub fn call(&self) -> PendingCall {
        PendingCall {
            method: self.method.clone(),
            path: self.path.clone(),
            body: self.body.clone(),
            idempotency_key: self.idempotency_key.clone(),
        }
    }
}

impl Destination {
    pub fn from_fields(id: i64, fields: DestinationFields) -> Self {
        Self {
            id,
            place_name: fields.place_name,
            weather: fields.weather,
            state: fields.state,
            district: fields.district,
            google_map_link: fields.google_map_link,
            image: fields.image,
            description: fields.description,
        }
    }

    pub fn fields(&self) -> DestinationFields {
        DestinationFields {
            place_name: self.place_name.clone(),
            weather: self.weather.clone(),
            state: self.state.clone(),
            district: self.district.clone(),
            google_map_link: self.google_map_link.clone(),
            image: self.image.clone(),
            description: self.description.clone(),
        }
    }

    /// case-insensitive containment of `fragment` in the place name.
    pub fn name_contains(&self, fragment: &str) -> bool {
        self.place_name.to_lowercase().contains(&fragment.to_lowercase())
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({}, {})", self.id, self.place_name, self.district, self.state)?;
        if let Some(image) = &self.image {
            write!(f, " [image: {}]", image)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination(name: &str) -> Destination {
        Destination {
            id: 1,
            place_name: name.to_string(),
            weather: "Sunny".to_string(),
            state: "Kerala".to_string(),
            district: "Idukki".to_string(),
            google_map_link: "https://maps.example/1".to_string(),
            image: None,
            description: "Hills.".to_string(),
        }
    }

    #[test]
    fn test_name_contains_ignores_case() {
        assert!(destination("Zoo Park").name_contains("zo"));
        assert!(destination("amazon falls").name_contains("ZO"));
        assert!(!destination("Lakeview").name_contains("zo"));
    }

    #[test]
    fn test_name_contains_empty_fragment() {
        assert!(destination("Lakeview").name_contains(""));
    }

    #[test]
    fn test_fields_round_trip() {
        let d = destination("Munnar");
        assert_eq!(Destination::from_fields(d.id, d.fields()), d);
    }

    #[test]
    fn test_display() {
        let mut d = destination("Munnar");
        assert_eq!(d.to_string(), "1: Munnar (Idukki, Kerala)");
        d.image = Some("destinations/ab.png".to_string());
        assert_eq!(d.to_string(), "1: Munnar (Idukki, Kerala) [image: destinations/ab.png]");
    }
}
