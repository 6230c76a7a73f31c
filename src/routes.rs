use std::{collections::HashMap, convert::Infallible, path::PathBuf, sync::Arc};

use bytes::BufMut;
use futures_util::TryStreamExt;
use warp::{
    Filter,
    multipart::{FormData, Part},
};

use crate::{
    SubmittedForm, Upload, db::Db, flash, handlers, remote::IDEMPOTENCY_KEY, render::Renderer,
    validate::RawDestination,
};

/// Upper bound for an HTML form submission, image included.
pub const MAX_FORM_BYTES: u64 = 6 * 1024 * 1024;
const MAX_JSON_BYTES: u64 = 1024 * 64;

/// A multipart body that could not be read.
#[derive(Debug)]
pub struct InvalidForm;

impl warp::reject::Reject for InvalidForm {}

fn with_db(db: Db) -> impl Filter<Extract = (Db,), Error = Infallible> + Clone {
    warp::any().map(move || db.clone())
}

fn with_renderer(renderer: Arc<Renderer>) -> impl Filter<Extract = (Arc<Renderer>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&renderer))
}

fn json_body() -> impl Filter<Extract = (RawDestination,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(MAX_JSON_BYTES).and(warp::body::json())
}

fn flash_cookie() -> impl Filter<Extract = (Option<String>,), Error = Infallible> + Clone {
    warp::cookie::optional::<String>(flash::COOKIE)
}

async fn read_part(part: Part) -> Result<(String, Option<String>, Vec<u8>), warp::Error> {
    let name = part.name().to_string();
    let filename = part.filename().map(str::to_string);
    let bytes = part
        .stream()
        .try_fold(Vec::new(), |mut acc, buf| async move {
            acc.put(buf);
            Ok(acc)
        })
        .await?;
    Ok((name, filename, bytes))
}

async fn read_form(form: FormData) -> Result<SubmittedForm, warp::Rejection> {
    let parts: Vec<Part> = form.try_collect().await.map_err(|e| {
        tracing::warn!("reading form: {e}");
        warp::reject::custom(InvalidForm)
    })?;

    let mut submitted = SubmittedForm::default();
    for part in parts {
        let (name, filename, bytes) = read_part(part).await.map_err(|e| {
            tracing::warn!("reading form part: {e}");
            warp::reject::custom(InvalidForm)
        })?;
        match filename {
            // browsers send an empty, unnamed file when nothing was picked
            Some(filename) if name == "image" => {
                if !filename.is_empty() && !bytes.is_empty() {
                    submitted.image = Some(Upload { filename, bytes });
                }
            }
            _ => {
                let value = String::from_utf8(bytes).map_err(|_| warp::reject::custom(InvalidForm))?;
                submitted.fields.insert(name, value);
            }
        }
    }
    Ok(submitted)
}

fn form_body() -> impl Filter<Extract = (SubmittedForm,), Error = warp::Rejection> + Clone {
    warp::multipart::form().max_length(MAX_FORM_BYTES).and_then(read_form)
}

// REST endpoints

fn list(db: Db) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("create")
        .and(warp::get())
        .and(with_db(db))
        .and_then(handlers::list)
}

fn create(db: Db) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("create")
        .and(warp::post())
        .and(warp::header::optional::<String>(IDEMPOTENCY_KEY))
        .and(json_body())
        .and(with_db(db))
        .and_then(handlers::create)
}

fn detail(db: Db) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("detail" / i64)
        .and(warp::get())
        .and(with_db(db))
        .and_then(handlers::retrieve)
}

fn update(db: Db) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let retrieve = warp::path!("update" / i64)
        .and(warp::get())
        .and(with_db(db.clone()))
        .and_then(handlers::retrieve);
    let put = warp::path!("update" / i64)
        .and(warp::put())
        .and(json_body())
        .and(with_db(db.clone()))
        .and_then(handlers::update);
    let patch = warp::path!("update" / i64)
        .and(warp::patch())
        .and(json_body())
        .and(with_db(db))
        .and_then(handlers::partial_update);
    retrieve.or(put).or(patch)
}

fn delete(db: Db) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("delete" / i64)
        .and(warp::delete())
        .and(with_db(db))
        .and_then(handlers::destroy)
}

fn search(db: Db) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("search" / String)
        .and(warp::get())
        .and(with_db(db))
        .and_then(|name: String, db: Db| async move { handlers::search(&name, db).await })
}

pub fn api_routes(db: Db) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    list(db.clone())
        .or(create(db.clone()))
        .or(detail(db.clone()))
        .or(update(db.clone()))
        .or(delete(db.clone()))
        .or(search(db))
}

// HTML pages

fn index(renderer: Arc<Renderer>) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path::end()
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(flash_cookie())
        .and(with_renderer(renderer))
        .and_then(
            |query: HashMap<String, String>, flash: Option<String>, renderer: Arc<Renderer>| async move {
                renderer.index(query.get("page").cloned(), flash).await
            },
        )
}

fn add(renderer: Arc<Renderer>) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let form = warp::path!("add")
        .and(warp::get())
        .and(flash_cookie())
        .and(with_renderer(Arc::clone(&renderer)))
        .and_then(|flash: Option<String>, renderer: Arc<Renderer>| async move { renderer.add_form(flash).await });
    let submit = warp::path!("add")
        .and(warp::post())
        .and(form_body())
        .and(with_renderer(renderer))
        .and_then(|form: SubmittedForm, renderer: Arc<Renderer>| async move { renderer.add(form).await });
    form.or(submit)
}

fn update_detail(renderer: Arc<Renderer>) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let form = warp::path!("update_detail" / i64)
        .and(warp::get())
        .and(flash_cookie())
        .and(with_renderer(Arc::clone(&renderer)))
        .and_then(|id: i64, flash: Option<String>, renderer: Arc<Renderer>| async move {
            renderer.update_form(id, flash).await
        });
    let submit = warp::path!("update_detail" / i64)
        .and(warp::post())
        .and(form_body())
        .and(with_renderer(renderer))
        .and_then(|id: i64, form: SubmittedForm, renderer: Arc<Renderer>| async move {
            renderer.update(id, form).await
        });
    form.or(submit)
}

fn destination_fetch(
    renderer: Arc<Renderer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("destination_fetch" / i64)
        .and(warp::get())
        .and(with_renderer(renderer))
        .and_then(|id: i64, renderer: Arc<Renderer>| async move { renderer.fetch(id).await })
}

fn destination_delete(
    renderer: Arc<Renderer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("destination_delete" / i64)
        .and(warp::get())
        .and(with_renderer(renderer))
        .and_then(|id: i64, renderer: Arc<Renderer>| async move { renderer.delete(id).await })
}

pub fn html_routes(renderer: Arc<Renderer>) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    index(Arc::clone(&renderer))
        .or(add(Arc::clone(&renderer)))
        .or(update_detail(Arc::clone(&renderer)))
        .or(destination_fetch(Arc::clone(&renderer)))
        .or(destination_delete(renderer))
}

pub fn get_routes(
    db: Db,
    renderer: Renderer,
    assets_dir: impl Into<PathBuf>,
    media_dir: impl Into<PathBuf>,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    let assets = warp::path("assets").and(warp::fs::dir(assets_dir.into()));
    let media = warp::path("media").and(warp::fs::dir(media_dir.into()));

    api_routes(db)
        .or(html_routes(Arc::new(renderer)))
        .or(assets)
        .or(media)
        .recover(handlers::handle_rejection)
}
