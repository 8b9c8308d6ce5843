use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::db_operations::DbError;
use crate::models::{Comment, NewComment};

const COMMENT_COLUMNS: &str = "id, post_id, author_name, author_email, content, is_deleted, created_at, updated_at";

fn row_to_comment(row: &Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_name: row.get(2)?,
        author_email: row.get(3)?,
        content: row.get(4)?,
        is_deleted: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub fn create_comment(conn: &Connection, comment: &NewComment) -> Result<Comment, DbError> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO comments (post_id, author_name, author_email, content, is_deleted, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
        params![comment.post_id, comment.author_name, comment.author_email, comment.content, now],
    )?;
    let id = conn.last_insert_rowid();
    read_comment(conn, id)?.ok_or(DbError::NotFound(format!("Comment {} vanished after insert.", id)))
}

pub fn read_comment(conn: &Connection, id: i64) -> Result<Option<Comment>, DbError> {
    let sql = format!("SELECT {} FROM comments WHERE id = ?1", COMMENT_COLUMNS);
    Ok(conn.query_row(&sql, [id], row_to_comment).optional()?)
}

/// Comments for a post, oldest first.
pub fn list_comments_for_post(conn: &Connection, post_id: &str, include_deleted: bool) -> Result<Vec<Comment>, DbError> {
    let sql = format!(
        "SELECT {} FROM comments WHERE post_id = ?1 AND (?2 OR is_deleted = 0) ORDER BY created_at ASC, id ASC",
        COMMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![post_id, include_deleted], row_to_comment)?;

    let mut comments = Vec::new();
    for comment in rows {
        comments.push(comment?);
    }
    Ok(comments)
}

pub fn soft_delete_comment(conn: &Connection, id: i64) -> Result<bool, DbError> {
    let changed = conn.execute(
        "UPDATE comments SET is_deleted = 1, updated_at = ?2 WHERE id = ?1 AND is_deleted = 0",
        params![id, Utc::now()],
    )?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::db_operations::posts_db_operations;
    use crate::models::Role;
    use crate::test_support::{memory_pool, post_draft, seed_user};

    fn new_comment(post_id: &str, content: &str) -> NewComment {
        NewComment {
            post_id: post_id.to_string(),
            author_name: "Reader".to_string(),
            author_email: "reader@example.com".to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn comments_list_in_order_and_hide_moderated_ones() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let user = seed_user(&conn, "owner@example.com", Role::Admin);
        let post = posts_db_operations::create_post(&conn, &post_draft("talk"), user.id).unwrap();

        let first = create_comment(&conn, &new_comment(&post.id, "first")).unwrap();
        let second = create_comment(&conn, &new_comment(&post.id, "second")).unwrap();
        assert!(soft_delete_comment(&conn, first.id).unwrap());
        assert!(!soft_delete_comment(&conn, first.id).unwrap());

        let visible = list_comments_for_post(&conn, &post.id, false).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, second.id);

        let all = list_comments_for_post(&conn, &post.id, true).unwrap();
        assert_eq!(all.iter().map(|c| c.content.as_str()).collect::<Vec<_>>(), vec!["first", "second"]);
    }

    #[test]
    fn comments_need_an_existing_post() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let err = create_comment(&conn, &new_comment("missing-post", "hello")).unwrap_err();
        assert!(matches!(err, DbError::Rusqlite(_)));
    }

    #[test]
    fn hard_deleting_a_post_cascades_to_its_comments() {
        let pool = memory_pool();
        let conn = pool.get().unwrap();
        let user = seed_user(&conn, "owner@example.com", Role::Admin);
        let post = posts_db_operations::create_post(&conn, &post_draft("talk"), user.id).unwrap();
        create_comment(&conn, &new_comment(&post.id, "bye")).unwrap();

        conn.execute("DELETE FROM posts WHERE id = ?1", [&post.id]).unwrap();
        let remaining: i64 = conn.query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0)).unwrap();
        assert_eq!(remaining, 0);
    }
}
