use chrono::Utc;
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::db_operations::DbError;
use crate::models::Subscriber;

const SUBSCRIBER_COLUMNS: &str = "id, email, unsubscribe_token, is_active, subscribed_at, unsubscribed_at";

#[derive(Debug)]
pub enum SubscribeOutcome {
    Created(Subscriber),
    /// A previously unsubscribed row was switched back on; its id is unchanged.
    Reactivated(Subscriber),
}

impl SubscribeOutcome {
    pub fn subscriber(&self) -> &Subscriber {
        match self {
            SubscribeOutcome::Created(s) | SubscribeOutcome::Reactivated(s) => s,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    AlreadyUnsubscribed,
}

fn row_to_subscriber(row: &Row) -> rusqlite::Result<Subscriber> {
    Ok(Subscriber {
        id: row.get(0)?,
        email: row.get(1)?,
        unsubscribe_token: row.get(2)?,
        is_active: row.get(3)?,
        subscribed_at: row.get(4)?,
        unsubscribed_at: row.get(5)?,
    })
}

/// 32 random bytes, hex encoded. Presented verbatim to unsubscribe.
pub fn generate_unsubscribe_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn read_subscriber_by_email(conn: &Connection, email: &str) -> Result<Option<Subscriber>, DbError> {
    let sql = format!("SELECT {} FROM subscribers WHERE email = ?1", SUBSCRIBER_COLUMNS);
    Ok(conn.query_row(&sql, [email], row_to_subscriber).optional()?)
}

/// `email` is expected to be normalized (trimmed, lowercase) already.
pub fn subscribe(conn: &Connection, email: &str) -> Result<SubscribeOutcome, DbError> {
    let now = Utc::now();
    match read_subscriber_by_email(conn, email)? {
        Some(existing) if existing.is_active => {
            Err(DbError::Conflict("This email is already subscribed.".to_string()))
        }
        Some(existing) => {
            conn.execute(
                "UPDATE subscribers SET is_active = 1, subscribed_at = ?2, unsubscribed_at = NULL WHERE id = ?1",
                params![existing.id, now],
            )?;
            let subscriber = read_subscriber_by_email(conn, email)?
                .ok_or(DbError::NotFound("Subscriber not found.".to_string()))?;
            Ok(SubscribeOutcome::Reactivated(subscriber))
        }
        None => {
            conn.execute(
                "INSERT INTO subscribers (email, unsubscribe_token, is_active, subscribed_at) VALUES (?1, ?2, 1, ?3)",
                params![email, generate_unsubscribe_token(), now],
            )?;
            let subscriber = read_subscriber_by_email(conn, email)?
                .ok_or(DbError::NotFound("Subscriber not found.".to_string()))?;
            Ok(SubscribeOutcome::Created(subscriber))
        }
    }
}

pub fn unsubscribe(conn: &Connection, token: &str) -> Result<UnsubscribeOutcome, DbError> {
    let is_active: Option<bool> = conn
        .query_row("SELECT is_active FROM subscribers WHERE unsubscribe_token = ?1", [token], |row| row.get(0))
        .optional()?;

    match is_active {
        None => Err(DbError::NotFound("Invalid unsubscribe token.".to_string())),
        Some(false) => Ok(UnsubscribeOutcome::AlreadyUnsubscribed),
        Some(true) => {
            conn.execute(
                "UPDATE subscribers SET is_active = 0, unsubscribed_at = ?2 WHERE unsubscribe_token = ?1",
                params![token, Utc::now()],
            )?;
            Ok(UnsubscribeOutcome::Unsubscribed)
        }
    }
}

pub fn list_subscribers(conn: &Connection) -> Result<Vec<Subscriber>, DbError> {
    let sql = format!("SELECT {} FROM subscribers ORDER BY subscribed_at DESC, id DESC", SUBSCRIBER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_subscriber)?;

    let mut subscribers = Vec::new();
    for subscriber in rows {
        subscribers.push(subscriber?);
    }
    Ok(subscribers)
}

pub fn list_active_subscribers(conn: &Connection) -> Result<Vec<Subscriber>, DbError> {
    let sql = format!("SELECT {} FROM subscribers WHERE is_active = 1 ORDER BY id", SUBSCRIBER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_subscriber)?;

    let mut subscribers = Vec::new();
    for subscriber in rows {
        subscribers.push(subscriber?);
    }
    Ok(subscribers)
}

pub fn delete_subscriber(conn: &Connection, id: i64) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM subscribers WHERE id = ?1", [id])?)
}
