use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of a post or letter. The format is fixed when the row is written and
/// stored next to the body in `content_format`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "body", rename_all = "lowercase")]
pub enum RichContent {
    Html(String),
    Document(Value),
}

impl RichContent {
    pub fn format(&self) -> &'static str {
        match self {
            RichContent::Html(_) => "html",
            RichContent::Document(_) => "document",
        }
    }

    /// Splits the content into its `(content_format, content)` column values.
    pub fn to_columns(&self) -> Result<(&'static str, String), serde_json::Error> {
        match self {
            RichContent::Html(html) => Ok((self.format(), html.clone())),
            RichContent::Document(doc) => Ok((self.format(), serde_json::to_string(doc)?)),
        }
    }

    pub fn from_columns(format: &str, body: String) -> Result<Self, String> {
        match format {
            "html" => Ok(RichContent::Html(body)),
            "document" => serde_json::from_str(&body)
                .map(RichContent::Document)
                .map_err(|e| format!("stored document is not valid JSON: {}", e)),
            other => Err(format!("unknown content format '{}'", other)),
        }
    }
}

/// Content as accepted over the API: an explicit `{format, body}` pair, a bare
/// HTML string, or a bare document object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ContentInput {
    Tagged(RichContent),
    Html(String),
    Document(Map<String, Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Author,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Author => "author",
        }
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "admin" => Ok(Role::Admin),
            "author" => Ok(Role::Author),
            other => Err(FromSqlError::Other(format!("unknown role '{}'", other).into())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    pub content: RichContent,
    pub author: String,
    pub tags: Vec<String>,
    pub image: Option<String>,
    pub read_time: String,
    pub slug: String,
    pub date: NaiveDate,
    pub category: String,
    pub is_deleted: bool,
    pub is_pinned: bool,
    pub created_by: Option<i32>,
    pub updated_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated, normalized field values for inserting or replacing a post.
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub title: String,
    pub excerpt: String,
    pub content: RichContent,
    pub author: String,
    pub tags: Vec<String>,
    pub image: Option<String>,
    pub read_time: String,
    pub slug: String,
    pub date: NaiveDate,
    pub category: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Letter {
    pub id: String,
    pub letter_number: i64,
    pub title: String,
    pub subtitle: Option<String>,
    pub recipient: Option<String>,
    pub content: RichContent,
    pub excerpt: String,
    pub author: String,
    pub slug: String,
    pub image: Option<String>,
    pub read_time: String,
    pub published_date: NaiveDate,
    pub series: Option<String>,
    pub tags: Vec<String>,
    pub is_deleted: bool,
    pub is_featured: bool,
    pub views: i64,
    pub shares: i64,
    pub created_by: Option<i32>,
    pub updated_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LetterDraft {
    /// `None` assigns the next number in sequence.
    pub letter_number: Option<i64>,
    pub title: String,
    pub subtitle: Option<String>,
    pub recipient: Option<String>,
    pub content: RichContent,
    pub excerpt: String,
    pub author: String,
    pub slug: String,
    pub image: Option<String>,
    pub read_time: String,
    pub published_date: NaiveDate,
    pub series: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesSummary {
    pub series: String,
    pub letter_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: String,
    pub author_name: String,
    #[serde(skip_serializing)]
    pub author_email: String,
    pub content: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: String,
    pub author_name: String,
    pub author_email: String,
    pub content: String,
}

/// A user as seen outside the data layer; the password hash stays in the table.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscriber {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub unsubscribe_token: String,
    pub is_active: bool,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

pub mod db_operations;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_input_accepts_string_object_and_tagged_forms() {
        let html: ContentInput = serde_json::from_value(json!("<p>Hi</p>")).unwrap();
        assert!(matches!(html, ContentInput::Html(ref s) if s == "<p>Hi</p>"));

        let doc: ContentInput = serde_json::from_value(json!({"type": "doc", "content": []})).unwrap();
        assert!(matches!(doc, ContentInput::Document(_)));

        let tagged: ContentInput = serde_json::from_value(json!({"format": "html", "body": "<p>x</p>"})).unwrap();
        assert!(matches!(tagged, ContentInput::Tagged(RichContent::Html(_))));
    }

    #[test]
    fn content_columns_keep_the_discriminant() {
        let doc = RichContent::Document(json!({"type": "doc"}));
        let (format, body) = doc.to_columns().unwrap();
        assert_eq!(format, "document");
        assert_eq!(RichContent::from_columns(format, body).unwrap(), doc);
        assert!(RichContent::from_columns("markdown", String::new()).is_err());
    }

    #[test]
    fn content_serializes_with_format_and_body() {
        let value = serde_json::to_value(RichContent::Html("<p>a</p>".into())).unwrap();
        assert_eq!(value, json!({"format": "html", "body": "<p>a</p>"}));
    }
}
