//! Mirroring of local writes onto the REST API.
//!
//! Each HTML mutation stores its matching REST call next to the local write.
//! The entry is recorded already claimed and the caller attempts it right
//! away. Whatever fails is released and left for the background replicator,
//! which claims an entry before each retry so no call is in flight twice.

use std::time::Duration;

use data_encoding::HEXLOWER;
use rand::Rng;

use crate::{
    db::Db,
    error::{DbError, RemoteCallError},
    model,
    remote::ApiClient,
    wire::DestinationPayload,
};

fn idempotency_key() -> String {
    let mut key = [0u8; 16];
    rand::rng().fill_bytes(&mut key);
    HEXLOWER.encode(&key)
}

/// POSTs carry a fresh idempotency key, so a replay after a lost response
/// does not create a second record.
pub fn create_call(fields: &model::DestinationFields) -> Result<model::PendingCall, DbError> {
    Ok(model::PendingCall {
        method: "POST".to_string(),
        path: "create/".to_string(),
        body: Some(serde_json::to_value(DestinationPayload::from(fields))?),
        idempotency_key: Some(idempotency_key()),
    })
}

pub fn update_call(destination: &model::Destination) -> Result<model::PendingCall, DbError> {
    Ok(model::PendingCall {
        method: "PUT".to_string(),
        path: format!("update/{}/", destination.id),
        body: Some(serde_json::to_value(DestinationPayload::from(&destination.fields()))?),
        idempotency_key: None,
    })
}

pub fn delete_call(id: i64) -> model::PendingCall {
    model::PendingCall {
        method: "DELETE".to_string(),
        path: format!("delete/{id}/"),
        body: None,
        idempotency_key: None,
    }
}

/// Status the API answers with when the call took effect.
fn accepted(call: &model::PendingCall, status: u16) -> bool {
    match call.method.as_str() {
        "POST" => status == 201,
        "PUT" => status == 200,
        // nothing left to delete on the other side is as good as deleting it
        "DELETE" => status == 204 || status == 404,
        _ => (200..300).contains(&status),
    }
}

pub async fn deliver(call: &model::PendingCall, client: &ApiClient) -> Result<(), RemoteCallError> {
    let response = client.send_pending(call).await?;
    if accepted(call, response.status) {
        Ok(())
    } else {
        Err(RemoteCallError::Status {
            status: response.status,
            body: response.body,
        })
    }
}

/// Attempt one queued entry the caller has claimed, and record the outcome.
/// Failure releases the claim.
pub async fn attempt(db: &Db, client: &ApiClient, entry_id: i64, call: &model::PendingCall) -> Result<(), RemoteCallError> {
    match deliver(call, client).await {
        Ok(()) => {
            tracing::info!("replicated {} {}", call.method, call.path);
            if let Err(e) = db.outbox.mark_delivered(entry_id).await {
                tracing::error!("{e}");
            }
            Ok(())
        }
        Err(e) => {
            tracing::warn!("replicating {} {} failed: {e}", call.method, call.path);
            if let Err(db_error) = db.outbox.mark_failed(entry_id, &e.to_string()).await {
                tracing::error!("{db_error}");
            }
            Err(e)
        }
    }
}

/// Retry everything still pending; returns (delivered, failed).
pub async fn run_once(db: &Db, client: &ApiClient, max_attempts: i64) -> Result<(usize, usize), DbError> {
    let pending = db.outbox.pending(max_attempts).await?;
    let mut delivered = 0;
    let mut failed = 0;
    for entry in pending {
        if !db.outbox.claim(entry.id, max_attempts).await? {
            tracing::debug!("outbox entry {} is already being delivered", entry.id);
            continue;
        }
        match attempt(db, client, entry.id, &entry.call()).await {
            Ok(()) => delivered += 1,
            Err(_) => {
                failed += 1;
                if entry.attempts + 1 >= max_attempts {
                    tracing::warn!(
                        "giving up on outbox entry {} ({} {}) after {} attempts",
                        entry.id,
                        entry.method,
                        entry.path,
                        entry.attempts + 1
                    );
                }
            }
        }
    }
    Ok((delivered, failed))
}

pub fn spawn_replicator(
    db: Db,
    client: ApiClient,
    interval: Duration,
    max_attempts: i64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match run_once(&db, &client, max_attempts).await {
                Ok((0, 0)) => {}
                Ok((delivered, failed)) => tracing::info!("outbox: {delivered} delivered, {failed} failed"),
                Err(e) => tracing::error!("{e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted() {
        let delete = delete_call(1);
        assert!(accepted(&delete, 204));
        assert!(accepted(&delete, 404));
        assert!(!accepted(&delete, 500));

        let post = model::PendingCall {
            method: "POST".to_string(),
            path: "create/".to_string(),
            body: None,
            idempotency_key: None,
        };
        assert!(accepted(&post, 201));
        assert!(!accepted(&post, 200));
        assert!(!accepted(&post, 400));
    }

    #[test]
    fn test_create_call_keys_differ() {
        let destination = model::DestinationFields {
            place_name: "Ooty".to_string(),
            weather: "Cool".to_string(),
            state: "Tamil Nadu".to_string(),
            district: "Nilgiris".to_string(),
            google_map_link: "https://maps.example/ooty".to_string(),
            image: None,
            description: "Hill station.".to_string(),
        };
        let first = create_call(&destination).unwrap();
        let second = create_call(&destination).unwrap();
        let key = first.idempotency_key.clone().unwrap();
        assert_eq!(key.len(), 32);
        assert_ne!(first.idempotency_key, second.idempotency_key);
        assert!(delete_call(3).idempotency_key.is_none());
    }

    #[test]
    fn test_update_call_path() {
        let destination = model::Destination {
            id: 12,
            place_name: "Ooty".to_string(),
            weather: "Cool".to_string(),
            state: "Tamil Nadu".to_string(),
            district: "Nilgiris".to_string(),
            google_map_link: "https://maps.example/ooty".to_string(),
            image: Some("destinations/ooty.jpg".to_string()),
            description: "Hill station.".to_string(),
        };
        let call = update_call(&destination).unwrap();
        assert_eq!(call.method, "PUT");
        assert_eq!(call.path, "update/12/");
        let body = call.body.unwrap();
        assert_eq!(body["place_name"], "Ooty");
        assert_eq!(body["image"], "/media/destinations/ooty.jpg");
        assert!(body.get("id").is_none());
    }
}
