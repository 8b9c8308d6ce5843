use chrono::Utc;
use rand::Rng;
use rusqlite::{params, Connection};

/// Tables whose rows carry a unique slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugTable {
    Posts,
    Letters,
}

impl SlugTable {
    fn table_name(&self) -> &'static str {
        match self {
            SlugTable::Posts => "posts",
            SlugTable::Letters => "letters",
        }
    }
}

/// Turns a title into a lowercase, hyphen-separated token made only of ASCII
/// letters, digits and single hyphens, with no hyphen at either end.
/// Whitespace, `-` and `_` separate words; every other character is dropped.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_hyphen = true;
        }
    }
    slug
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Millisecond timestamp plus six random characters, all base 36.
pub fn unique_suffix() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u128;
    let random: u128 = rand::thread_rng().gen_range(0..36u128.pow(6));
    format!("{}{:0>6}", to_base36(millis), to_base36(random))
}

/// Deleted rows still hold their slug, so they count.
pub fn slug_exists(conn: &Connection, table: SlugTable, slug: &str, exclude_id: Option<&str>) -> rusqlite::Result<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE slug = ?1 AND (?2 IS NULL OR id != ?2))",
        table.table_name()
    );
    conn.query_row(&sql, params![slug, exclude_id], |row| row.get(0))
}

/// Returns `base` when free, otherwise `base-<suffix>`. The suffixed slug is
/// not re-checked; the unique index catches the rare collision.
pub fn ensure_unique_slug(
    conn: &Connection,
    table: SlugTable,
    base: &str,
    exclude_id: Option<&str>,
) -> rusqlite::Result<String> {
    if slug_exists(conn, table, base, exclude_id)? {
        Ok(format!("{}-{}", base, unique_suffix()))
    } else {
        Ok(base.to_string())
    }
}
