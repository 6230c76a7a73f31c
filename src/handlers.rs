use std::convert::Infallible;

use percent_encoding::percent_decode_str;
use warp::http::StatusCode;

use crate::{
    db,
    error::{DbError, ValidationError},
    model,
    validate::{self, RawDestination},
    wire::{self, DestinationWire},
};

fn detail(message: &str, status: StatusCode) -> Box<dyn warp::Reply> {
    Box::new(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "detail": message })),
        status,
    ))
}

fn invalid(errors: &ValidationError) -> Box<dyn warp::Reply> {
    Box::new(warp::reply::with_status(warp::reply::json(errors), StatusCode::BAD_REQUEST))
}

fn failed(e: DbError) -> Box<dyn warp::Reply> {
    match e {
        DbError::NotFound(id) => {
            tracing::debug!("destination {id} not found");
            detail("Not found.", StatusCode::NOT_FOUND)
        }
        e => {
            tracing::error!("{e}");
            detail("A server error occurred.", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn many(destinations: &[model::Destination]) -> Vec<DestinationWire> {
    destinations.iter().map(wire::to_wire).collect()
}

pub async fn list(db: db::Db) -> Result<Box<dyn warp::Reply>, Infallible> {
    match db.destination.get_all().await {
        Ok(destinations) => Ok(Box::new(warp::reply::json(&many(&destinations)))),
        Err(e) => Ok(failed(e)),
    }
}

/// A request carrying an `Idempotency-Key` seen before gets the record that
/// key first created instead of a new one.
pub async fn create(
    idempotency_key: Option<String>,
    request: RawDestination,
    db: db::Db,
) -> Result<Box<dyn warp::Reply>, Infallible> {
    let fields = match validate::validate(wire::raw_from_json(request)) {
        Ok(fields) => fields,
        Err(errors) => return Ok(invalid(&errors)),
    };

    tracing::debug!("creating destination: {:#?}", &fields);
    let saved = match idempotency_key {
        Some(key) => db.insert_idempotent(&key, &fields).await.map(|(saved, replayed)| {
            if replayed {
                tracing::info!("replayed create {key}, destination {}", saved.id);
            }
            saved
        }),
        None => db.destination.insert(&fields).await,
    };
    match saved {
        Ok(saved) => {
            tracing::trace!("saved new db entry with id: {}", saved.id);
            let reply = warp::reply::with_header(
                warp::reply::with_status(warp::reply::json(&wire::to_wire(&saved)), StatusCode::CREATED),
                "Location",
                format!("/detail/{}/", saved.id),
            );
            Ok(Box::new(reply))
        }
        Err(e) => Ok(failed(e)),
    }
}

pub async fn retrieve(id: i64, db: db::Db) -> Result<Box<dyn warp::Reply>, Infallible> {
    match db.destination.get(id).await {
        Ok(destination) => Ok(Box::new(warp::reply::json(&wire::to_wire(&destination)))),
        Err(e) => Ok(failed(e)),
    }
}

async fn save(id: i64, raw: RawDestination, db: db::Db) -> Result<Box<dyn warp::Reply>, Infallible> {
    let fields = match validate::validate(raw) {
        Ok(fields) => fields,
        Err(errors) => return Ok(invalid(&errors)),
    };

    tracing::debug!("updating destination id: {id}");
    match db.destination.update(id, &fields).await {
        Ok(updated) => Ok(Box::new(warp::reply::json(&wire::to_wire(&updated)))),
        Err(e) => Ok(failed(e)),
    }
}

/// Full overwrite. An omitted image keeps the stored one.
pub async fn update(id: i64, request: RawDestination, db: db::Db) -> Result<Box<dyn warp::Reply>, Infallible> {
    let existing = match db.destination.get(id).await {
        Ok(existing) => existing,
        Err(e) => return Ok(failed(e)),
    };

    let mut raw = wire::raw_from_json(request);
    if raw.image.is_none() {
        raw.image = existing.image;
    }
    save(id, raw, db).await
}

/// Overwrite only the keys present in the body.
pub async fn partial_update(
    id: i64,
    request: RawDestination,
    db: db::Db,
) -> Result<Box<dyn warp::Reply>, Infallible> {
    let existing = match db.destination.get(id).await {
        Ok(existing) => existing,
        Err(e) => return Ok(failed(e)),
    };

    let raw = wire::raw_from_json(request).merged_over(&existing);
    save(id, raw, db).await
}

pub async fn destroy(id: i64, db: db::Db) -> Result<Box<dyn warp::Reply>, Infallible> {
    match db.destination.delete(id).await {
        Ok(()) => {
            tracing::info!("deleted destination {id}");
            Ok(Box::new(StatusCode::NO_CONTENT))
        }
        Err(e) => Ok(failed(e)),
    }
}

/// Never a 404: no match is an empty list.
pub async fn search(name: &str, db: db::Db) -> Result<Box<dyn warp::Reply>, Infallible> {
    let fragment = percent_decode_str(name).decode_utf8_lossy();
    tracing::debug!("searching destinations for: {}", &fragment);

    match db.destination.search(&fragment).await {
        Ok(destinations) => Ok(Box::new(warp::reply::json(&many(&destinations)))),
        Err(e) => Ok(failed(e)),
    }
}

/// Map filter rejections onto JSON error bodies.
pub async fn handle_rejection(err: warp::Rejection) -> Result<Box<dyn warp::Reply>, Infallible> {
    if err.is_not_found() {
        return Ok(detail("Not found.", StatusCode::NOT_FOUND));
    }
    if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        tracing::debug!("{e}");
        return Ok(detail(&format!("JSON parse error - {e}"), StatusCode::BAD_REQUEST));
    }
    if err.find::<crate::routes::InvalidForm>().is_some() {
        return Ok(detail("Could not read the submitted form.", StatusCode::BAD_REQUEST));
    }
    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(detail("Request body too large.", StatusCode::PAYLOAD_TOO_LARGE));
    }
    if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        return Ok(detail("Unsupported media type in request.", StatusCode::UNSUPPORTED_MEDIA_TYPE));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(detail("Method not allowed.", StatusCode::METHOD_NOT_ALLOWED));
    }

    tracing::error!("unhandled rejection: {:?}", err);
    Ok(detail("A server error occurred.", StatusCode::INTERNAL_SERVER_ERROR))
}
