use std::{convert::Infallible, path::Path};

use csrf::{AesGcmCsrfProtection, CsrfProtection};
use handlebars::Handlebars;
use rand::Rng;

use crate::{
    SubmittedForm, db,
    error::{MediaError, ValidationError},
    flash::{self, Flash},
    media::MediaStore,
    model, outbox,
    pagination::{self, PAGE_SIZE},
    remote::ApiClient,
    validate::{self, RawDestination},
    wire,
};

pub const TEMPLATES: [&str; 5] = [
    "base",
    "index",
    "add_destination",
    "update_destination",
    "destination_fetch",
];

const ADDED: &str = "Destination added and data sent successfully.";
const UPDATED: &str = "Destination updated and data sent successfully.";
const QUEUED: &str = "The destination was saved and will be sent to the API again later.";
const EXPIRED: &str = "The form has expired, please try again.";
const NOT_VALID: &str = "Form is not valid";

struct Message {
    msg: String,
}

impl Message {
    fn new(message: &str) -> Self {
        Self {
            msg: message.to_string(),
        }
    }
}

impl warp::Reply for Message {
    fn into_response(self) -> warp::reply::Response {
        warp::reply::Response::new(self.msg.into())
    }
}

handlebars::handlebars_helper!(truncate: |s: String, len: u64| {
    let len = len as usize;
    if s.chars().count() > len {
        format!("{}…", s.chars().take(len).collect::<String>())
    } else {
        s
    }
});

/// Register every page template found in `dir` (`<name>.hbs`).
pub fn load_templates(dir: impl AsRef<Path>) -> Result<Handlebars<'static>, handlebars::TemplateError> {
    let mut handlebars = Handlebars::new();
    for name in TEMPLATES {
        handlebars.register_template_file(name, dir.as_ref().join(format!("{name}.hbs")))?;
    }
    Ok(handlebars)
}

/// The HTML side of the application.
#[derive(Clone, Debug)]
pub struct Renderer {
    csrf_token: csrf::CsrfToken,
    pub(crate) db: db::Db,
    pub(crate) handlebars: Handlebars<'static>,
    pub(crate) api: ApiClient,
    pub(crate) media: MediaStore,
}

impl Renderer {
    pub fn new(db: db::Db, handlebars: Handlebars<'static>, api: ApiClient, media: MediaStore) -> Self {
        let mut secret_key = [0u8; 32];
        rand::rng().fill_bytes(&mut secret_key);
        let protect = AesGcmCsrfProtection::from_key(secret_key);

        let mut nonce = [0u8; 64];
        rand::rng().fill_bytes(&mut nonce);
        let csrf_token: csrf::CsrfToken = protect
            .generate_token(&nonce)
            .unwrap_or_else(|_| csrf::CsrfToken::new(nonce.to_vec()));

        let mut bars = handlebars;
        bars.register_helper("truncate", Box::new(truncate));
        Self {
            csrf_token,
            db,
            handlebars: bars,
            api,
            media,
        }
    }

    pub fn xsrf(&self) -> String {
        self.csrf_token.b64_string()
    }
}

fn location(location: &str) -> warp::http::Uri {
    location
        .parse::<warp::http::Uri>()
        .unwrap_or_else(|_| warp::http::Uri::from_static("/"))
}

/// 303 to `location`, handing `messages` to the next page.
fn redirect(location_str: &str, messages: &[Flash]) -> Result<Box<dyn warp::Reply>, Infallible> {
    let reply = warp::reply::with_header(
        warp::redirect::see_other(location(location_str)),
        "Cache-Control",
        "no-cache",
    );
    if messages.is_empty() {
        Ok(Box::new(reply))
    } else {
        Ok(Box::new(warp::reply::with_header(
            reply,
            "Set-Cookie",
            flash::set_cookie(messages),
        )))
    }
}

fn response(message: &str, status: warp::http::StatusCode) -> Result<Box<dyn warp::Reply>, Infallible> {
    Ok(Box::new(warp::reply::with_status(Message::new(message), status)))
}

fn form_values(raw: &RawDestination) -> serde_json::Value {
    serde_json::json!({
        "place_name": raw.place_name,
        "weather": raw.weather,
        "state": raw.state,
        "district": raw.district,
        "google_map_link": raw.google_map_link,
        "description": raw.description,
    })
}

impl Renderer {
    /// Render `template`, attaching the messages and clearing a consumed flash cookie.
    fn page(
        &self,
        template: &str,
        mut data: serde_json::Value,
        messages: Vec<Flash>,
        consumed_flash: bool,
    ) -> Result<Box<dyn warp::Reply>, Infallible> {
        data["messages"] = serde_json::json!(messages);
        data["XSRF"] = serde_json::json!(self.xsrf());
        match self.handlebars.render(template, &data) {
            Ok(body) => {
                let html = warp::reply::html(body);
                if consumed_flash {
                    Ok(Box::new(warp::reply::with_header(html, "Set-Cookie", flash::clear_cookie())))
                } else {
                    Ok(Box::new(html))
                }
            }
            Err(e) => {
                tracing::error!("{e}");
                response("Could not render page", warp::http::StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn messages(flash_cookie: Option<&str>) -> (Vec<Flash>, bool) {
        match flash_cookie {
            Some(cookie) => (flash::decode(cookie), true),
            None => (Vec::new(), false),
        }
    }

    /// The reference an upload will be stored under, or `fallback` when
    /// there is none. Nothing touches the disk until the form is valid.
    fn upload_reference(&self, form: &SubmittedForm, fallback: Option<String>) -> (Option<String>, Option<MediaError>) {
        match &form.image {
            Some(upload) => match self.media.reference(&upload.filename, &upload.bytes) {
                Ok(reference) => (Some(reference), None),
                Err(e) => {
                    tracing::warn!("rejected upload {}: {e}", upload.filename);
                    (fallback, Some(e))
                }
            },
            None => (fallback, None),
        }
    }

    async fn store_upload(form: &SubmittedForm, media: &MediaStore) -> Result<(), ValidationError> {
        if let Some(upload) = &form.image {
            if let Err(e) = media.save(&upload.filename, &upload.bytes).await {
                tracing::error!("storing upload {}: {e}", upload.filename);
                let mut errors = ValidationError::default();
                errors.add("image", &e.to_string());
                return Err(errors);
            }
        }
        Ok(())
    }

    /// Validation, plus whatever went wrong with the upload, as one error set.
    fn check(raw: RawDestination, upload_error: Option<MediaError>) -> Result<model::DestinationFields, ValidationError> {
        let result = validate::validate(raw);
        match (result, upload_error) {
            (Ok(fields), None) => Ok(fields),
            (result, upload_error) => {
                let mut errors = result.err().unwrap_or_default();
                if let Some(e) = upload_error {
                    errors.add("image", &e.to_string());
                }
                Err(errors)
            }
        }
    }

    pub async fn index(&self, page: Option<String>, flash_cookie: Option<String>) -> Result<Box<dyn warp::Reply>, Infallible> {
        let (mut messages, consumed) = Self::messages(flash_cookie.as_deref());

        let destinations: Vec<wire::DestinationWire> = match self.db.destination.get_all().await {
            Ok(destinations) => destinations.iter().map(wire::to_wire).collect(),
            Err(e) => {
                tracing::error!("{e}");
                messages.push(Flash::error("Could not load destinations."));
                Vec::new()
            }
        };
        let page = pagination::paginate(&destinations, PAGE_SIZE, page.as_deref());

        let api_destinations = match self.api.list().await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!("Error fetching data from API: {e}");
                Vec::new()
            }
        };

        self.page(
            "index",
            serde_json::json!({"page": page, "api_destinations": api_destinations}),
            messages,
            consumed,
        )
    }

    pub async fn add_form(&self, flash_cookie: Option<String>) -> Result<Box<dyn warp::Reply>, Infallible> {
        let (messages, consumed) = Self::messages(flash_cookie.as_deref());
        self.page(
            "add_destination",
            serde_json::json!({"form": {}, "errors": {}}),
            messages,
            consumed,
        )
    }

    pub async fn add(&self, form: SubmittedForm) -> Result<Box<dyn warp::Reply>, Infallible> {
        if form.xsrf() != self.xsrf() {
            return redirect("/", &[Flash::error(EXPIRED)]);
        }

        let mut raw = form.raw();
        let (image, upload_error) = self.upload_reference(&form, None);
        raw.image = image;
        let checked = match Self::check(raw.clone(), upload_error) {
            Ok(fields) => Self::store_upload(&form, &self.media).await.map(|()| fields),
            Err(errors) => Err(errors),
        };
        let fields = match checked {
            Ok(fields) => fields,
            Err(errors) => {
                return self.page(
                    "add_destination",
                    serde_json::json!({"form": form_values(&raw), "errors": errors}),
                    vec![Flash::error(NOT_VALID)],
                    false,
                );
            }
        };

        let call = match outbox::create_call(&fields) {
            Ok(call) => call,
            Err(e) => {
                tracing::error!("{e}");
                return redirect("/", &[Flash::error("Could not save the destination.")]);
            }
        };
        let (saved, entry) = match self.db.insert_replicated(&fields, &call).await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::error!("{e}");
                return redirect("/", &[Flash::error("Could not save the destination.")]);
            }
        };
        tracing::info!("added destination {}", saved);

        match outbox::attempt(&self.db, &self.api, entry, &call).await {
            Ok(()) => redirect("/", &[Flash::success(ADDED)]),
            Err(e) => redirect("/", &[Flash::error(e.to_string()), Flash::error(QUEUED)]),
        }
    }

    pub async fn update_form(&self, id: i64, flash_cookie: Option<String>) -> Result<Box<dyn warp::Reply>, Infallible> {
        let (messages, consumed) = Self::messages(flash_cookie.as_deref());
        match self.db.destination.get(id).await {
            Ok(destination) => self.page(
                "update_destination",
                serde_json::json!({
                    "destination": wire::to_wire(&destination),
                    "form": form_values(&RawDestination::from(&destination)),
                    "errors": {},
                }),
                messages,
                consumed,
            ),
            Err(e) => {
                tracing::debug!("{e}");
                response("Not found", warp::http::StatusCode::NOT_FOUND)
            }
        }
    }

    pub async fn update(&self, id: i64, form: SubmittedForm) -> Result<Box<dyn warp::Reply>, Infallible> {
        let existing = match self.db.destination.get(id).await {
            Ok(existing) => existing,
            Err(e) => {
                tracing::debug!("{e}");
                return response("Not found", warp::http::StatusCode::NOT_FOUND);
            }
        };
        if form.xsrf() != self.xsrf() {
            return redirect(&format!("/update_detail/{id}/"), &[Flash::error(EXPIRED)]);
        }

        let mut raw = form.raw();
        let (image, upload_error) = self.upload_reference(&form, existing.image.clone());
        raw.image = image;
        let checked = match Self::check(raw.clone(), upload_error) {
            Ok(fields) => Self::store_upload(&form, &self.media).await.map(|()| fields),
            Err(errors) => Err(errors),
        };
        let fields = match checked {
            Ok(fields) => fields,
            Err(errors) => {
                return self.page(
                    "update_destination",
                    serde_json::json!({
                        "destination": wire::to_wire(&existing),
                        "form": form_values(&raw),
                        "errors": errors,
                    }),
                    vec![Flash::error(NOT_VALID)],
                    false,
                );
            }
        };

        let updated = model::Destination::from_fields(id, fields.clone());
        let call = match outbox::update_call(&updated) {
            Ok(call) => call,
            Err(e) => {
                tracing::error!("{e}");
                return redirect(&format!("/update_detail/{id}/"), &[Flash::error("Could not save the destination.")]);
            }
        };
        let (saved, entry) = match self.db.update_replicated(id, &fields, &call).await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::error!("{e}");
                return redirect(&format!("/update_detail/{id}/"), &[Flash::error("Could not save the destination.")]);
            }
        };
        tracing::info!("updated destination {}", saved);

        match outbox::attempt(&self.db, &self.api, entry, &call).await {
            Ok(()) => redirect("/", &[Flash::success(UPDATED)]),
            Err(e) => self.page(
                "update_destination",
                serde_json::json!({
                    "destination": wire::to_wire(&saved),
                    "form": form_values(&RawDestination::from(&saved)),
                    "errors": {},
                }),
                vec![Flash::error(e.to_string()), Flash::error(QUEUED)],
                false,
            ),
        }
    }

    /// Detail page sourced from the API rather than the local store.
    pub async fn fetch(&self, id: i64) -> Result<Box<dyn warp::Reply>, Infallible> {
        match self.api.detail(id).await {
            Ok(destination) => {
                tracing::debug!("fetched destination: {:?}", &destination);
                self.page("destination_fetch", serde_json::json!({"destination": destination}), Vec::new(), false)
            }
            Err(e) => {
                tracing::warn!("{e}");
                self.page(
                    "destination_fetch",
                    serde_json::json!({"error_message": e.to_string()}),
                    Vec::new(),
                    false,
                )
            }
        }
    }

    /// Always lands on the index; the outcome is only logged.
    pub async fn delete(&self, id: i64) -> Result<Box<dyn warp::Reply>, Infallible> {
        let call = outbox::delete_call(id);
        match self.db.delete_replicated(id, &call).await {
            Ok((existed, entry)) => {
                if !existed {
                    tracing::info!("destination {id} was not stored locally");
                }
                match outbox::attempt(&self.db, &self.api, entry, &call).await {
                    Ok(()) => tracing::info!("Item with ID {id} has been deleted"),
                    Err(e) => match e.status() {
                        Some(status) => tracing::warn!("Failed to delete item {id}: API answered {status}"),
                        None => tracing::warn!("Failed to delete item {id}: {e}"),
                    },
                }
            }
            Err(e) => tracing::error!("{e}"),
        }
        redirect("/", &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        let mut bars = Handlebars::new();
        bars.register_helper("truncate", Box::new(truncate));
        let res = bars
            .render_template("{{truncate text 5}}", &serde_json::json!({"text": "Backwaters of Kerala"}))
            .unwrap();
        assert_eq!(res, "Backw…");
        let res = bars
            .render_template("{{truncate text 50}}", &serde_json::json!({"text": "Short"}))
            .unwrap();
        assert_eq!(res, "Short");
    }

    #[test]
    fn test_templates_load() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");
        let bars = load_templates(dir).unwrap();
        for name in TEMPLATES {
            assert!(bars.has_template(name), "{name}");
        }
    }

    #[test]
    fn test_form_values_escape_in_template() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");
        let bars = load_templates(dir).unwrap();
        let raw = RawDestination {
            place_name: Some("<script>".to_string()),
            ..Default::default()
        };
        let html = bars
            .render(
                "add_destination",
                &serde_json::json!({"form": form_values(&raw), "errors": {}, "messages": [], "XSRF": "t"}),
            )
            .unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
