use rusqlite::{Connection, Transaction};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

const TABLES: &[(&str, &str)] = &[
    (
        "users",
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'admin' CHECK(role IN ('admin', 'author')),
            is_active INTEGER NOT NULL DEFAULT 1,
            last_login TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "posts",
        "CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            excerpt TEXT NOT NULL DEFAULT '',
            content_format TEXT NOT NULL CHECK(content_format IN ('html', 'document')),
            content TEXT NOT NULL,
            author TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            image TEXT,
            read_time TEXT NOT NULL DEFAULT '',
            slug TEXT NOT NULL UNIQUE,
            date TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'General',
            is_deleted INTEGER NOT NULL DEFAULT 0,
            is_pinned INTEGER NOT NULL DEFAULT 0,
            created_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
            updated_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "letters",
        "CREATE TABLE IF NOT EXISTS letters (
            id TEXT PRIMARY KEY,
            letter_number INTEGER NOT NULL UNIQUE,
            title TEXT NOT NULL,
            subtitle TEXT,
            recipient TEXT,
            content_format TEXT NOT NULL CHECK(content_format IN ('html', 'document')),
            content TEXT NOT NULL,
            excerpt TEXT NOT NULL DEFAULT '',
            author TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            image TEXT,
            read_time TEXT NOT NULL DEFAULT '',
            published_date TEXT NOT NULL,
            series TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            is_deleted INTEGER NOT NULL DEFAULT 0,
            is_featured INTEGER NOT NULL DEFAULT 0,
            views INTEGER NOT NULL DEFAULT 0,
            shares INTEGER NOT NULL DEFAULT 0,
            created_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
            updated_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "comments",
        "CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            author_name TEXT NOT NULL,
            author_email TEXT NOT NULL,
            content TEXT NOT NULL CHECK(length(content) BETWEEN 1 AND 2000),
            is_deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "subscribers",
        "CREATE TABLE IF NOT EXISTS subscribers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            unsubscribe_token TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 1,
            subscribed_at TEXT NOT NULL,
            unsubscribed_at TEXT
        )",
    ),
];

// Tag containment goes through json_each, which SQLite cannot index.
const INDEXES: &[(&str, &str)] = &[
    ("idx_posts_active_date", "CREATE INDEX IF NOT EXISTS idx_posts_active_date ON posts(is_deleted, date DESC)"),
    ("idx_posts_author", "CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author) WHERE is_deleted = 0"),
    ("idx_posts_created_by", "CREATE INDEX IF NOT EXISTS idx_posts_created_by ON posts(created_by)"),
    ("idx_posts_pinned", "CREATE INDEX IF NOT EXISTS idx_posts_pinned ON posts(is_pinned) WHERE is_pinned = 1"),
    ("idx_letters_active_number", "CREATE INDEX IF NOT EXISTS idx_letters_active_number ON letters(is_deleted, letter_number DESC)"),
    ("idx_letters_featured", "CREATE INDEX IF NOT EXISTS idx_letters_featured ON letters(is_featured) WHERE is_featured = 1"),
    ("idx_letters_series", "CREATE INDEX IF NOT EXISTS idx_letters_series ON letters(series) WHERE series IS NOT NULL"),
    ("idx_comments_post", "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at)"),
    ("idx_subscribers_active", "CREATE INDEX IF NOT EXISTS idx_subscribers_active ON subscribers(is_active)"),
];

/// Columns added after the first release. Each is added only when missing.
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    ("posts", "read_time", "TEXT NOT NULL DEFAULT ''"),
    ("letters", "series", "TEXT"),
    ("letters", "shares", "INTEGER NOT NULL DEFAULT 0"),
    ("comments", "is_deleted", "INTEGER NOT NULL DEFAULT 0"),
    ("subscribers", "unsubscribed_at", "TEXT"),
];

/// Creates every table and index. Safe to run against an existing database.
pub fn setup_database(conn: &mut Connection) -> Result<(), SetupError> {
    let tx = conn.transaction()?;
    for (name, ddl) in TABLES {
        println!("- Creating '{}' table...", name);
        tx.execute(ddl, [])?;
    }
    create_indexes(&tx)?;
    tx.commit()?;
    Ok(())
}

fn create_indexes(tx: &Transaction) -> Result<(), SetupError> {
    for (name, ddl) in INDEXES {
        println!("- Creating index '{}'...", name);
        tx.execute(ddl, [])?;
    }
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, SetupError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Applies additive migrations. Returns a line per change actually made, so a
/// second run returns an empty list.
pub fn run_migrations(conn: &mut Connection) -> Result<Vec<String>, SetupError> {
    let tx = conn.transaction()?;
    let mut applied = Vec::new();

    for (table, column, definition) in ADDED_COLUMNS {
        if column_exists(&tx, table, column)? {
            println!("- Column '{}.{}' already present, skipping.", table, column);
            continue;
        }
        tx.execute(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition), [])?;
        let line = format!("Added column '{}.{}'", table, column);
        println!("- {}", line);
        applied.push(line);
    }

    for (name, ddl) in INDEXES {
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1)",
            [name],
            |row| row.get(0),
        )?;
        if exists {
            continue;
        }
        tx.execute(ddl, [])?;
        let line = format!("Created index '{}'", name);
        println!("- {}", line);
        applied.push(line);
    }

    tx.commit()?;
    Ok(applied)
}
