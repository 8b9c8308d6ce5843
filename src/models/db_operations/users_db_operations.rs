use bcrypt::{hash, verify};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::db_operations::DbError;
use crate::models::{Role, User, UserUpdate};

const USER_COLUMNS: &str = "id, email, name, role, is_active, last_login, created_at, updated_at";

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
        is_active: row.get(4)?,
        last_login: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Inserts a user with a bcrypt hash of `password`. A taken email is a conflict.
pub fn create_user(conn: &Connection, email: &str, name: &str, password: &str, role: Role) -> Result<User, DbError> {
    let hashed_password = hash(password, bcrypt::DEFAULT_COST)?;
    let now = Utc::now();
    if let Err(e) = conn.execute(
        "INSERT INTO users (email, password_hash, name, role, is_active, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
        params![email, hashed_password, name, role, now],
    ) {
        let err = DbError::from(e);
        if err.is_unique_violation() {
            return Err(DbError::Conflict(format!("A user with email '{}' already exists.", email)));
        }
        return Err(err);
    }

    let id = conn.last_insert_rowid() as i32;
    read_user_by_id(conn, id)?.ok_or(DbError::NotFound(format!("User {} vanished after insert.", id)))
}

pub fn read_all_users(conn: &Connection) -> Result<Vec<User>, DbError> {
    let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_user)?;

    let mut users = Vec::new();
    for user in rows {
        users.push(user?);
    }
    Ok(users)
}

pub fn read_user_by_id(conn: &Connection, id: i32) -> Result<Option<User>, DbError> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, [id], row_to_user).optional()?)
}

pub fn read_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DbError> {
    let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, [email], row_to_user).optional()?)
}

/// Returns the user when `email` belongs to an active account and `password`
/// matches its stored hash.
pub fn verify_credentials(conn: &Connection, email: &str, password: &str) -> Result<Option<User>, DbError> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT password_hash FROM users WHERE email = ?1 AND is_active = 1",
            [email],
            |row| row.get(0),
        )
        .optional()?;

    let Some(password_hash) = stored else {
        return Ok(None);
    };
    if !verify(password, &password_hash).unwrap_or(false) {
        return Ok(None);
    }
    read_user_by_email(conn, email)
}

pub fn update_last_login(conn: &Connection, id: i32) -> Result<(), DbError> {
    conn.execute("UPDATE users SET last_login = ?1 WHERE id = ?2", params![Utc::now(), id])?;
    Ok(())
}

/// Applies the fields present in `update`. A new password is re-hashed.
pub fn update_user(conn: &Connection, id: i32, update: &UserUpdate) -> Result<User, DbError> {
    let password_hash = match update.new_password.as_deref() {
        Some(password) => Some(hash(password, bcrypt::DEFAULT_COST)?),
        None => None,
    };

    let changed = conn.execute(
        "UPDATE users SET name = COALESCE(?2, name), role = COALESCE(?3, role), \
         is_active = COALESCE(?4, is_active), password_hash = COALESCE(?5, password_hash), updated_at = ?6 \
         WHERE id = ?1",
        params![id, update.name, update.role, update.is_active, password_hash, Utc::now()],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound("User not found.".to_string()));
    }

    read_user_by_id(conn, id)?.ok_or(DbError::NotFound("User not found.".to_string()))
}

pub fn delete_user(conn: &Connection, id: i32) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;

    #[test]
    fn verifies_active_users_only() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let user = create_user(&conn, "admin@example.com", "Admin", "correct horse battery", Role::Admin).unwrap();

        let found = verify_credentials(&conn, "admin@example.com", "correct horse battery").unwrap();
        assert_eq!(found.unwrap().id, user.id);
        assert!(verify_credentials(&conn, "admin@example.com", "wrong password!").unwrap().is_none());
        assert!(verify_credentials(&conn, "nobody@example.com", "correct horse battery").unwrap().is_none());

        let update = UserUpdate { is_active: Some(false), ..UserUpdate::default() };
        update_user(&conn, user.id, &update).unwrap();
        assert!(verify_credentials(&conn, "admin@example.com", "correct horse battery").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        create_user(&conn, "admin@example.com", "Admin", "correct horse battery", Role::Admin).unwrap();
        let err = create_user(&conn, "admin@example.com", "Other", "correct horse battery", Role::Admin).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let user = create_user(&conn, "admin@example.com", "Admin", "correct horse battery", Role::Admin).unwrap();

        let update = UserUpdate { name: Some("Renamed".to_string()), ..UserUpdate::default() };
        let updated = update_user(&conn, user.id, &update).unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.role, Role::Admin);
        assert!(updated.is_active);
    }

    #[test]
    fn last_login_is_recorded() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let user = create_user(&conn, "admin@example.com", "Admin", "correct horse battery", Role::Admin).unwrap();
        assert!(user.last_login.is_none());

        update_last_login(&conn, user.id).unwrap();
        assert!(read_user_by_id(&conn, user.id).unwrap().unwrap().last_login.is_some());
    }
}
