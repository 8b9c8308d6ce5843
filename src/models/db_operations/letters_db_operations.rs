use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::models::db_operations::{content_from_row, tags_from_row, tags_to_column, DbError};
use crate::models::{Letter, LetterDraft, SeriesSummary};

const LETTER_COLUMNS: &str = "id, letter_number, title, subtitle, recipient, content_format, content, excerpt, \
     author, slug, image, read_time, published_date, series, tags, is_deleted, is_featured, views, shares, \
     created_by, updated_by, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct LetterFilter {
    pub series: Option<String>,
    pub tag: Option<String>,
    pub include_deleted: bool,
    pub limit: u32,
    pub offset: u32,
}

impl Default for LetterFilter {
    fn default() -> Self {
        LetterFilter { series: None, tag: None, include_deleted: false, limit: 20, offset: 0 }
    }
}

/// Counters a reader can bump on a live letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterCounter {
    Views,
    Shares,
}

fn row_to_letter(row: &Row) -> rusqlite::Result<Letter> {
    Ok(Letter {
        id: row.get(0)?,
        letter_number: row.get(1)?,
        title: row.get(2)?,
        subtitle: row.get(3)?,
        recipient: row.get(4)?,
        content: content_from_row(row, 5, 6)?,
        excerpt: row.get(7)?,
        author: row.get(8)?,
        slug: row.get(9)?,
        image: row.get(10)?,
        read_time: row.get(11)?,
        published_date: row.get(12)?,
        series: row.get(13)?,
        tags: tags_from_row(row, 14)?,
        is_deleted: row.get(15)?,
        is_featured: row.get(16)?,
        views: row.get(17)?,
        shares: row.get(18)?,
        created_by: row.get(19)?,
        updated_by: row.get(20)?,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
    })
}

/// Next number in the letter sequence. Deleted letters keep their numbers.
pub fn next_letter_number(conn: &Connection) -> Result<i64, DbError> {
    Ok(conn.query_row("SELECT COALESCE(MAX(letter_number), 0) + 1 FROM letters", [], |row| row.get(0))?)
}

pub fn create_letter(conn: &Connection, draft: &LetterDraft, user_id: i32) -> Result<Letter, DbError> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let letter_number = match draft.letter_number {
        Some(n) => n,
        None => next_letter_number(conn)?,
    };
    let (content_format, content) = draft.content.to_columns()?;
    let tags = tags_to_column(&draft.tags)?;

    conn.execute(
        "INSERT INTO letters (id, letter_number, title, subtitle, recipient, content_format, content, excerpt, author, \
         slug, image, read_time, published_date, series, tags, is_deleted, is_featured, views, shares, created_by, \
         updated_by, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 0, 0, 0, 0, ?16, ?16, ?17, ?17)",
        params![
            id, letter_number, draft.title, draft.subtitle, draft.recipient, content_format, content, draft.excerpt,
            draft.author, draft.slug, draft.image, draft.read_time, draft.published_date, draft.series, tags,
            user_id, now
        ],
    )?;

    read_letter(conn, &id, true)?.ok_or(DbError::NotFound(format!("Letter {} vanished after insert.", id)))
}

/// Replaces the editable fields of a live letter. A `None` letter number keeps the current one.
pub fn update_letter(conn: &Connection, id: &str, draft: &LetterDraft, user_id: i32) -> Result<Letter, DbError> {
    let (content_format, content) = draft.content.to_columns()?;
    let tags = tags_to_column(&draft.tags)?;

    let changed = conn.execute(
        "UPDATE letters SET letter_number = COALESCE(?2, letter_number), title = ?3, subtitle = ?4, recipient = ?5, \
         content_format = ?6, content = ?7, excerpt = ?8, author = ?9, slug = ?10, image = ?11, read_time = ?12, \
         published_date = ?13, series = ?14, tags = ?15, updated_by = ?16, updated_at = ?17 \
         WHERE id = ?1 AND is_deleted = 0",
        params![
            id, draft.letter_number, draft.title, draft.subtitle, draft.recipient, content_format, content,
            draft.excerpt, draft.author, draft.slug, draft.image, draft.read_time, draft.published_date,
            draft.series, tags, user_id, Utc::now()
        ],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound("Letter not found.".to_string()));
    }

    read_letter(conn, id, false)?.ok_or(DbError::NotFound("Letter not found.".to_string()))
}

pub fn read_letter(conn: &Connection, id: &str, include_deleted: bool) -> Result<Option<Letter>, DbError> {
    let sql = format!("SELECT {} FROM letters WHERE id = ?1 AND (?2 OR is_deleted = 0)", LETTER_COLUMNS);
    Ok(conn.query_row(&sql, params![id, include_deleted], row_to_letter).optional()?)
}

pub fn read_letter_by_slug_or_id(conn: &Connection, key: &str, include_deleted: bool) -> Result<Option<Letter>, DbError> {
    let sql = format!(
        "SELECT {} FROM letters WHERE (slug = ?1 OR id = ?1) AND (?2 OR is_deleted = 0) \
         ORDER BY (slug = ?1) DESC LIMIT 1",
        LETTER_COLUMNS
    );
    Ok(conn.query_row(&sql, params![key, include_deleted], row_to_letter).optional()?)
}

/// Newest letter number first.
pub fn list_letters(conn: &Connection, filter: &LetterFilter) -> Result<Vec<Letter>, DbError> {
    let sql = format!(
        "SELECT {} FROM letters \
         WHERE (?1 OR is_deleted = 0) \
           AND (?2 IS NULL OR series = ?2) \
           AND (?3 IS NULL OR EXISTS (SELECT 1 FROM json_each(letters.tags) WHERE lower(json_each.value) = lower(?3))) \
         ORDER BY letter_number DESC \
         LIMIT ?4 OFFSET ?5",
        LETTER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![filter.include_deleted, filter.series, filter.tag, filter.limit, filter.offset],
        row_to_letter,
    )?;

    let mut letters = Vec::new();
    for letter in rows {
        letters.push(letter?);
    }
    Ok(letters)
}

pub fn list_series(conn: &Connection) -> Result<Vec<SeriesSummary>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT series, COUNT(*) FROM letters WHERE is_deleted = 0 AND series IS NOT NULL \
         GROUP BY series ORDER BY series",
    )?;
    let rows = stmt.query_map([], |row| Ok(SeriesSummary { series: row.get(0)?, letter_count: row.get(1)? }))?;

    let mut series = Vec::new();
    for entry in rows {
        series.push(entry?);
    }
    Ok(series)
}

pub fn read_featured_letter(conn: &Connection) -> Result<Option<Letter>, DbError> {
    let sql = format!("SELECT {} FROM letters WHERE is_featured = 1 AND is_deleted = 0 LIMIT 1", LETTER_COLUMNS);
    Ok(conn.query_row(&sql, [], row_to_letter).optional()?)
}

pub fn soft_delete_letter(conn: &Connection, id: &str, user_id: i32) -> Result<bool, DbError> {
    let changed = conn.execute(
        "UPDATE letters SET is_deleted = 1, is_featured = 0, updated_by = ?2, updated_at = ?3 \
         WHERE id = ?1 AND is_deleted = 0",
        params![id, user_id, Utc::now()],
    )?;
    Ok(changed > 0)
}

/// Makes `id` the only featured letter, in one statement.
pub fn feature_letter(conn: &Connection, id: &str) -> Result<(), DbError> {
    let is_deleted: Option<bool> = conn
        .query_row("SELECT is_deleted FROM letters WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;

    match is_deleted {
        None => return Err(DbError::NotFound("Letter not found.".to_string())),
        Some(true) => return Err(DbError::Invalid("Cannot feature a deleted letter.".to_string())),
        Some(false) => {}
    }

    conn.execute("UPDATE letters SET is_featured = (id = ?1) WHERE is_deleted = 0", [id])?;
    Ok(())
}

pub fn unfeature_letter(conn: &Connection, id: &str) -> Result<(), DbError> {
    let changed = conn.execute("UPDATE letters SET is_featured = 0 WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(DbError::NotFound("Letter not found.".to_string()));
    }
    Ok(())
}

/// Increments a counter on a live letter and returns the new value.
pub fn increment_counter(conn: &Connection, id: &str, counter: LetterCounter) -> Result<i64, DbError> {
    let sql = match counter {
        LetterCounter::Views => "UPDATE letters SET views = views + 1 WHERE id = ?1 AND is_deleted = 0 RETURNING views",
        LetterCounter::Shares => "UPDATE letters SET shares = shares + 1 WHERE id = ?1 AND is_deleted = 0 RETURNING shares",
    };
    conn.query_row(sql, [id], |row| row.get(0))
        .optional()?
        .ok_or(DbError::NotFound("Letter not found.".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::test_support::{letter_draft, memory_pool, seed_user};

    #[test]
    fn letter_numbers_are_sequential() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let user = seed_user(&conn, "writer@example.com", Role::Admin);

        let first = create_letter(&conn, &letter_draft("dear-one"), user.id).unwrap();
        let second = create_letter(&conn, &letter_draft("dear-two"), user.id).unwrap();

        assert_eq!(first.letter_number, 1);
        assert_eq!(second.letter_number, 2);
    }

    #[test]
    fn explicit_duplicate_letter_number_conflicts() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let user = seed_user(&conn, "writer@example.com", Role::Admin);
        create_letter(&conn, &letter_draft("dear-one"), user.id).unwrap();

        let mut dup = letter_draft("dear-again");
        dup.letter_number = Some(1);
        assert!(create_letter(&conn, &dup, user.id).unwrap_err().is_unique_violation());
    }

    #[test]
    fn featuring_is_exclusive() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let user = seed_user(&conn, "writer@example.com", Role::Admin);
        let a = create_letter(&conn, &letter_draft("a"), user.id).unwrap();
        let b = create_letter(&conn, &letter_draft("b"), user.id).unwrap();

        feature_letter(&conn, &a.id).unwrap();
        feature_letter(&conn, &b.id).unwrap();

        let featured: i64 = conn
            .query_row("SELECT COUNT(*) FROM letters WHERE is_featured = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(featured, 1);
        assert_eq!(read_featured_letter(&conn).unwrap().unwrap().id, b.id);

        unfeature_letter(&conn, &b.id).unwrap();
        assert!(read_featured_letter(&conn).unwrap().is_none());
    }

    #[test]
    fn deleted_letters_cannot_be_featured() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let user = seed_user(&conn, "writer@example.com", Role::Admin);
        let a = create_letter(&conn, &letter_draft("a"), user.id).unwrap();
        soft_delete_letter(&conn, &a.id, user.id).unwrap();

        assert!(matches!(feature_letter(&conn, &a.id), Err(DbError::Invalid(_))));
    }

    #[test]
    fn counters_increment_and_skip_deleted_letters() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let user = seed_user(&conn, "writer@example.com", Role::Admin);
        let a = create_letter(&conn, &letter_draft("a"), user.id).unwrap();

        assert_eq!(increment_counter(&conn, &a.id, LetterCounter::Views).unwrap(), 1);
        assert_eq!(increment_counter(&conn, &a.id, LetterCounter::Views).unwrap(), 2);
        assert_eq!(increment_counter(&conn, &a.id, LetterCounter::Shares).unwrap(), 1);

        soft_delete_letter(&conn, &a.id, user.id).unwrap();
        assert!(matches!(increment_counter(&conn, &a.id, LetterCounter::Views), Err(DbError::NotFound(_))));
    }

    #[test]
    fn series_are_grouped() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let user = seed_user(&conn, "writer@example.com", Role::Admin);
        for slug in ["a", "b"] {
            let mut draft = letter_draft(slug);
            draft.series = Some("Letters to a Young Engineer".to_string());
            create_letter(&conn, &draft, user.id).unwrap();
        }
        create_letter(&conn, &letter_draft("loose"), user.id).unwrap();

        let series = list_series(&conn).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].letter_count, 2);

        let filter = LetterFilter { series: Some("Letters to a Young Engineer".to_string()), ..LetterFilter::default() };
        assert_eq!(list_letters(&conn, &filter).unwrap().len(), 2);
    }
}
