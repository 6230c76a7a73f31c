use std::sync::Arc;

use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;

use crate::{error::DbError, model};

const DESTINATION_COLUMNS: &str = "ID, place_name, weather, state, district, google_map_link, image, description";
const OUTBOX_COLUMNS: &str = "ID, method, path, body, idempotency_key, attempts, last_error, claimed, created, updated";

#[derive(Clone, Debug)]
pub struct DestinationDAO {
    connection: Arc<Mutex<Connection>>,
}

#[derive(Clone, Debug)]
pub struct OutboxDAO {
    connection: Arc<Mutex<Connection>>,
}

#[derive(Clone, Debug)]
pub struct Db {
    connection: Arc<Mutex<Connection>>,
    pub destination: DestinationDAO,
    pub outbox: OutboxDAO,
}

fn destination_from_row(row: &rusqlite::Row<'_>) -> Result<model::Destination, rusqlite::Error> {
    Ok(model::Destination {
        id: row.get(0)?,
        place_name: row.get(1)?,
        weather: row.get(2)?,
        state: row.get(3)?,
        district: row.get(4)?,
        google_map_link: row.get(5)?,
        image: row.get(6)?,
        description: row.get(7)?,
    })
}

fn outbox_from_row(row: &rusqlite::Row<'_>) -> Result<model::OutboxEntry, rusqlite::Error> {
    Ok(model::OutboxEntry {
        id: row.get(0)?,
        method: row.get(1)?,
        path: row.get(2)?,
        body: row.get(3)?,
        idempotency_key: row.get(4)?,
        attempts: row.get(5)?,
        last_error: row.get(6)?,
        claimed: row.get(7)?,
        created: row.get(8)?,
        updated: row.get(9)?,
    })
}

fn insert_destination(conn: &Connection, fields: &model::DestinationFields) -> Result<model::Destination, DbError> {
    conn.execute(
        r#"INSERT INTO destination (place_name, weather, state, district, google_map_link, image, description)
    values (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
        params![
            fields.place_name,
            fields.weather,
            fields.state,
            fields.district,
            fields.google_map_link,
            fields.image,
            fields.description
        ],
    )?;
    Ok(model::Destination::from_fields(conn.last_insert_rowid(), fields.clone()))
}

fn update_destination(
    conn: &Connection,
    id: i64,
    fields: &model::DestinationFields,
) -> Result<model::Destination, DbError> {
    let changed = conn.execute(
        r#"UPDATE destination
    SET place_name = ?1,
        weather = ?2,
        state = ?3,
        district = ?4,
        google_map_link = ?5,
        image = ?6,
        description = ?7
    WHERE
        ID = ?8"#,
        params![
            fields.place_name,
            fields.weather,
            fields.state,
            fields.district,
            fields.google_map_link,
            fields.image,
            fields.description,
            id
        ],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound(id));
    }
    Ok(model::Destination::from_fields(id, fields.clone()))
}

fn delete_destination(conn: &Connection, id: i64) -> Result<(), DbError> {
    match conn.execute(r#"DELETE FROM destination WHERE ID = ?1"#, [id])? {
        0 => Err(DbError::NotFound(id)),
        _ => Ok(()),
    }
}

/// Queue `call` already claimed: whoever records it delivers it first.
fn insert_outbox(conn: &Connection, call: &model::PendingCall) -> Result<i64, DbError> {
    let now = chrono::Utc::now();
    conn.execute(
        r#"INSERT INTO outbox (method, path, body, idempotency_key, attempts, last_error, claimed, created, updated)
    values (?1, ?2, ?3, ?4, 0, NULL, ?5, ?5, ?5)"#,
        params![call.method, call.path, call.body, call.idempotency_key, now],
    )?;
    Ok(conn.last_insert_rowid())
}

impl DestinationDAO {
    fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    pub async fn insert(&self, fields: &model::DestinationFields) -> Result<model::Destination, DbError> {
        let conn = self.connection.lock().await;
        insert_destination(&conn, fields)
    }

    pub async fn get(&self, id: i64) -> Result<model::Destination, DbError> {
        let conn = self.connection.lock().await;

        let mut stmt = conn.prepare(&format!("SELECT {DESTINATION_COLUMNS} FROM destination WHERE ID = ?1"))?;
        stmt.query_one([id], destination_from_row)
            .optional()?
            .ok_or(DbError::NotFound(id))
    }

    /// every destination, in insertion order.
    pub async fn get_all(&self) -> Result<Vec<model::Destination>, DbError> {
        let conn = self.connection.lock().await;

        let mut stmt = conn.prepare(&format!("SELECT {DESTINATION_COLUMNS} FROM destination ORDER BY ID"))?;
        let rows = stmt.query([])?;
        let results: Vec<model::Destination> = rows.map(destination_from_row).collect()?;
        Ok(results)
    }

    pub async fn update(&self, id: i64, fields: &model::DestinationFields) -> Result<model::Destination, DbError> {
        let conn = self.connection.lock().await;
        update_destination(&conn, id, fields)
    }

    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let conn = self.connection.lock().await;
        delete_destination(&conn, id)
    }

    /// Case-insensitive substring match on the place name. Matching happens
    /// here rather than in SQL because sqlite's LIKE only folds ASCII.
    pub async fn search(&self, fragment: &str) -> Result<Vec<model::Destination>, DbError> {
        let all = self.get_all().await?;
        Ok(all.into_iter().filter(|d| d.name_contains(fragment)).collect())
    }
}

impl OutboxDAO {
    fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    pub async fn get(&self, id: i64) -> Result<Option<model::OutboxEntry>, DbError> {
        let conn = self.connection.lock().await;

        let mut stmt = conn.prepare(&format!("SELECT {OUTBOX_COLUMNS} FROM outbox WHERE ID = ?1"))?;
        Ok(stmt.query_one([id], outbox_from_row).optional()?)
    }

    /// unclaimed entries still eligible for delivery, oldest first.
    pub async fn pending(&self, max_attempts: i64) -> Result<Vec<model::OutboxEntry>, DbError> {
        let conn = self.connection.lock().await;

        let mut stmt = conn.prepare(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox WHERE attempts < ?1 AND claimed IS NULL ORDER BY ID"
        ))?;
        let rows = stmt.query([max_attempts])?;
        let results: Vec<model::OutboxEntry> = rows.map(outbox_from_row).collect()?;
        Ok(results)
    }

    pub async fn get_all(&self) -> Result<Vec<model::OutboxEntry>, DbError> {
        let conn = self.connection.lock().await;

        let mut stmt = conn.prepare(&format!("SELECT {OUTBOX_COLUMNS} FROM outbox ORDER BY ID"))?;
        let rows = stmt.query([])?;
        let results: Vec<model::OutboxEntry> = rows.map(outbox_from_row).collect()?;
        Ok(results)
    }

    /// Take the entry for one delivery. False when someone else holds it,
    /// it is gone, or it has used up its attempts.
    pub async fn claim(&self, id: i64, max_attempts: i64) -> Result<bool, DbError> {
        let conn = self.connection.lock().await;
        let changed = conn.execute(
            r#"UPDATE outbox SET claimed = ?1 WHERE ID = ?2 AND claimed IS NULL AND attempts < ?3"#,
            params![chrono::Utc::now(), id, max_attempts],
        )?;
        Ok(changed == 1)
    }

    pub async fn mark_delivered(&self, id: i64) -> Result<(), DbError> {
        let conn = self.connection.lock().await;
        conn.execute(r#"DELETE FROM outbox WHERE ID = ?1"#, [id])?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: i64, error: &str) -> Result<(), DbError> {
        let conn = self.connection.lock().await;
        conn.execute(
            r#"UPDATE outbox SET attempts = attempts + 1, last_error = ?1, claimed = NULL, updated = ?2 WHERE ID = ?3"#,
            params![error, chrono::Utc::now(), id],
        )?;
        Ok(())
    }
}

fn boxed(conn: Connection) -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(conn))
}

fn create_destination_table(conn: &Connection) -> Result<(), rusqlite::Error> {
    // AUTOINCREMENT keeps ids of deleted rows from being handed out again
    conn.execute(
        r#"create table if not exists destination(
    ID              INTEGER PRIMARY KEY AUTOINCREMENT,
    place_name      TEXT    NOT NULL,
    weather         TEXT    NOT NULL,
    state           TEXT    NOT NULL,
    district        TEXT    NOT NULL,
    google_map_link TEXT    NOT NULL,
    image           TEXT,            -- media-relative path
    description     TEXT    NOT NULL
)"#,
        (),
    )?;

    Ok(())
}

fn create_outbox_table(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        r#"create table if not exists outbox(
    ID         INTEGER PRIMARY KEY AUTOINCREMENT,
    method     TEXT    NOT NULL,
    path       TEXT    NOT NULL,
    body       TEXT,
    idempotency_key TEXT,
    attempts   INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    claimed    TEXT,            -- delivery in flight since
    created    TEXT    NOT NULL,
    updated    TEXT    NOT NULL
)"#,
        (),
    )?;

    Ok(())
}

fn create_idempotency_table(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        r#"create table if not exists idempotency_key(
    key            TEXT    PRIMARY KEY,
    destination_id INTEGER NOT NULL,
    created        TEXT    NOT NULL
)"#,
        (),
    )?;

    Ok(())
}

impl Db {
    pub fn new(connection: Connection) -> Result<Self, rusqlite::Error> {
        create_destination_table(&connection)?;
        create_outbox_table(&connection)?;
        create_idempotency_table(&connection)?;
        // nothing is in flight before this process starts
        connection.execute(r#"UPDATE outbox SET claimed = NULL WHERE claimed IS NOT NULL"#, ())?;

        let boxed_connection = boxed(connection);
        Ok(Self {
            connection: Arc::clone(&boxed_connection),
            destination: DestinationDAO::new(Arc::clone(&boxed_connection)),
            outbox: OutboxDAO::new(Arc::clone(&boxed_connection)),
        })
    }

    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Insert a destination and queue the call that mirrors it, in one transaction.
    pub async fn insert_replicated(
        &self,
        fields: &model::DestinationFields,
        call: &model::PendingCall,
    ) -> Result<(model::Destination, i64), DbError> {
        let mut conn = self.connection.lock().await;
        let tx = conn.transaction()?;
        let destination = insert_destination(&tx, fields)?;
        let entry = insert_outbox(&tx, call)?;
        tx.commit()?;
        Ok((destination, entry))
    }

    pub async fn update_replicated(
        &self,
        id: i64,
        fields: &model::DestinationFields,
        call: &model::PendingCall,
    ) -> Result<(model::Destination, i64), DbError> {
        let mut conn = self.connection.lock().await;
        let tx = conn.transaction()?;
        let destination = update_destination(&tx, id, fields)?;
        let entry = insert_outbox(&tx, call)?;
        tx.commit()?;
        Ok((destination, entry))
    }

    /// Insert once per `key`. A repeated key hands back the record it first
    /// created, with `true` to mark the replay.
    pub async fn insert_idempotent(
        &self,
        key: &str,
        fields: &model::DestinationFields,
    ) -> Result<(model::Destination, bool), DbError> {
        let mut conn = self.connection.lock().await;
        let tx = conn.transaction()?;
        let seen: Option<i64> = tx
            .query_one(
                r#"SELECT destination_id FROM idempotency_key WHERE key = ?1"#,
                [key],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = seen {
            let mut stmt = tx.prepare(&format!("SELECT {DESTINATION_COLUMNS} FROM destination WHERE ID = ?1"))?;
            let existing = stmt
                .query_one([id], destination_from_row)
                .optional()?
                .ok_or(DbError::NotFound(id))?;
            return Ok((existing, true));
        }

        let destination = insert_destination(&tx, fields)?;
        tx.execute(
            r#"INSERT INTO idempotency_key (key, destination_id, created) values (?1, ?2, ?3)"#,
            params![key, destination.id, chrono::Utc::now()],
        )?;
        tx.commit()?;
        Ok((destination, false))
    }

    /// Delete locally and queue the mirrored delete. A record that is already
    /// gone locally still gets its delete queued.
    pub async fn delete_replicated(&self, id: i64, call: &model::PendingCall) -> Result<(bool, i64), DbError> {
        let mut conn = self.connection.lock().await;
        let tx = conn.transaction()?;
        let existed = match delete_destination(&tx, id) {
            Ok(()) => true,
            Err(DbError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };
        let entry = insert_outbox(&tx, call)?;
        tx.commit()?;
        Ok((existed, entry))
    }
}
