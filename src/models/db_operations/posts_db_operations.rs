use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::models::db_operations::{content_from_row, tags_from_row, tags_to_column, DbError};
use crate::models::{Post, PostDraft};

const POST_COLUMNS: &str = "id, title, excerpt, content_format, content, author, tags, image, read_time, \
     slug, date, category, is_deleted, is_pinned, created_by, updated_by, created_at, updated_at";

/// Filters for the post listing. Soft-deleted rows are only returned when
/// `include_deleted` is set.
#[derive(Debug, Clone)]
pub struct PostFilter {
    pub tag: Option<String>,
    pub category: Option<String>,
    pub author: Option<String>,
    pub include_deleted: bool,
    pub limit: u32,
    pub offset: u32,
}

impl Default for PostFilter {
    fn default() -> Self {
        PostFilter { tag: None, category: None, author: None, include_deleted: false, limit: 20, offset: 0 }
    }
}

fn row_to_post(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        excerpt: row.get(2)?,
        content: content_from_row(row, 3, 4)?,
        author: row.get(5)?,
        tags: tags_from_row(row, 6)?,
        image: row.get(7)?,
        read_time: row.get(8)?,
        slug: row.get(9)?,
        date: row.get(10)?,
        category: row.get(11)?,
        is_deleted: row.get(12)?,
        is_pinned: row.get(13)?,
        created_by: row.get(14)?,
        updated_by: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

pub fn create_post(conn: &Connection, draft: &PostDraft, user_id: i32) -> Result<Post, DbError> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let (content_format, content) = draft.content.to_columns()?;
    let tags = tags_to_column(&draft.tags)?;

    conn.execute(
        "INSERT INTO posts (id, title, excerpt, content_format, content, author, tags, image, read_time, slug, date, \
         category, is_deleted, is_pinned, created_by, updated_by, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, 0, ?13, ?13, ?14, ?14)",
        params![
            id, draft.title, draft.excerpt, content_format, content, draft.author, tags, draft.image,
            draft.read_time, draft.slug, draft.date, draft.category, user_id, now
        ],
    )?;

    read_post(conn, &id, true)?.ok_or(DbError::NotFound(format!("Post {} vanished after insert.", id)))
}

/// Replaces the editable fields of a live post. Flags and ownership are untouched.
pub fn update_post(conn: &Connection, id: &str, draft: &PostDraft, user_id: i32) -> Result<Post, DbError> {
    let (content_format, content) = draft.content.to_columns()?;
    let tags = tags_to_column(&draft.tags)?;

    let changed = conn.execute(
        "UPDATE posts SET title = ?2, excerpt = ?3, content_format = ?4, content = ?5, author = ?6, tags = ?7, \
         image = ?8, read_time = ?9, slug = ?10, date = ?11, category = ?12, updated_by = ?13, updated_at = ?14 \
         WHERE id = ?1 AND is_deleted = 0",
        params![
            id, draft.title, draft.excerpt, content_format, content, draft.author, tags, draft.image,
            draft.read_time, draft.slug, draft.date, draft.category, user_id, Utc::now()
        ],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound("Post not found.".to_string()));
    }

    read_post(conn, id, false)?.ok_or(DbError::NotFound("Post not found.".to_string()))
}

pub fn read_post(conn: &Connection, id: &str, include_deleted: bool) -> Result<Option<Post>, DbError> {
    let sql = format!("SELECT {} FROM posts WHERE id = ?1 AND (?2 OR is_deleted = 0)", POST_COLUMNS);
    Ok(conn.query_row(&sql, params![id, include_deleted], row_to_post).optional()?)
}

/// Looks a post up by slug first, then by id.
pub fn read_post_by_slug_or_id(conn: &Connection, key: &str, include_deleted: bool) -> Result<Option<Post>, DbError> {
    let sql = format!(
        "SELECT {} FROM posts WHERE (slug = ?1 OR id = ?1) AND (?2 OR is_deleted = 0) \
         ORDER BY (slug = ?1) DESC LIMIT 1",
        POST_COLUMNS
    );
    Ok(conn.query_row(&sql, params![key, include_deleted], row_to_post).optional()?)
}

/// Pinned post first, then newest by date.
pub fn list_posts(conn: &Connection, filter: &PostFilter) -> Result<Vec<Post>, DbError> {
    let sql = format!(
        "SELECT {} FROM posts \
         WHERE (?1 OR is_deleted = 0) \
           AND (?2 IS NULL OR EXISTS (SELECT 1 FROM json_each(posts.tags) WHERE lower(json_each.value) = lower(?2))) \
           AND (?3 IS NULL OR category = ?3) \
           AND (?4 IS NULL OR author = ?4) \
         ORDER BY is_pinned DESC, date DESC, created_at DESC \
         LIMIT ?5 OFFSET ?6",
        POST_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![filter.include_deleted, filter.tag, filter.category, filter.author, filter.limit, filter.offset],
        row_to_post,
    )?;

    let mut posts = Vec::new();
    for post in rows {
        posts.push(post?);
    }
    Ok(posts)
}

pub fn read_pinned_post(conn: &Connection) -> Result<Option<Post>, DbError> {
    let sql = format!("SELECT {} FROM posts WHERE is_pinned = 1 AND is_deleted = 0 LIMIT 1", POST_COLUMNS);
    Ok(conn.query_row(&sql, [], row_to_post).optional()?)
}

/// Marks a live post deleted and drops its pin. Returns `false` when there was
/// no live post with that id, so repeating the call has no effect.
pub fn soft_delete_post(conn: &Connection, id: &str, user_id: i32) -> Result<bool, DbError> {
    let changed = conn.execute(
        "UPDATE posts SET is_deleted = 1, is_pinned = 0, updated_by = ?2, updated_at = ?3 \
         WHERE id = ?1 AND is_deleted = 0",
        params![id, user_id, Utc::now()],
    )?;
    Ok(changed > 0)
}

/// Makes `id` the only pinned post. The flag is rewritten for every live row in
/// a single statement so no reader sees zero or two pinned posts.
pub fn pin_post(conn: &Connection, id: &str) -> Result<(), DbError> {
    let is_deleted: Option<bool> = conn
        .query_row("SELECT is_deleted FROM posts WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;

    match is_deleted {
        None => return Err(DbError::NotFound("Post not found.".to_string())),
        Some(true) => return Err(DbError::Invalid("Cannot pin a deleted post.".to_string())),
        Some(false) => {}
    }

    conn.execute("UPDATE posts SET is_pinned = (id = ?1) WHERE is_deleted = 0", [id])?;
    Ok(())
}

pub fn unpin_post(conn: &Connection, id: &str) -> Result<(), DbError> {
    let changed = conn.execute("UPDATE posts SET is_pinned = 0 WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(DbError::NotFound("Post not found.".to_string()));
    }
    Ok(())
}
