use std::collections::HashMap;

use validate::RawDestination;

pub mod db;
pub mod error;
pub mod flash;
pub mod handlers;
pub mod media;
pub mod model;
pub mod outbox;
pub mod pagination;
pub mod remote;
pub mod render;
pub mod routes;
pub mod validate;
pub mod wire;

/// A file submitted through an HTML form.
#[derive(Clone, Debug, Default)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A decoded `multipart/form-data` submission from the HTML forms.
#[derive(Clone, Debug, Default)]
pub struct SubmittedForm {
    pub fields: HashMap<String, String>,
    pub image: Option<Upload>,
}

impl SubmittedForm {
    pub fn get(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    pub fn xsrf(&self) -> &str {
        self.fields.get("xsrf").map(String::as_str).unwrap_or_default()
    }

    /// The text fields, without any image; images only arrive as uploads.
    pub fn raw(&self) -> RawDestination {
        RawDestination {
            place_name: self.get("place_name"),
            weather: self.get("weather"),
            state: self.get("state"),
            district: self.get("district"),
            google_map_link: self.get("google_map_link"),
            image: None,
            description: self.get("description"),
        }
    }
}
