use regex::Regex;
use std::sync::OnceLock;

pub const MIN_PASSWORD_LENGTH: usize = 12;
pub const MAX_COMMENT_LENGTH: usize = 2000;
pub const MAX_NAME_LENGTH: usize = 100;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Emails are compared and stored trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!("Password must be at least {} characters long.", MIN_PASSWORD_LENGTH));
    }
    Ok(())
}

/// Returns the trimmed comment body when it is between 1 and 2000 characters.
pub fn validate_comment_content(content: &str) -> Result<String, String> {
    let trimmed = content.trim();
    let length = trimmed.chars().count();
    if length == 0 {
        return Err("Comment content is required.".to_string());
    }
    if length > MAX_COMMENT_LENGTH {
        return Err(format!("Comment must be at most {} characters.", MAX_COMMENT_LENGTH));
    }
    Ok(trimmed.to_string())
}

pub fn validate_name(name: &str) -> Result<String, String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name is required.".to_string());
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(format!("Name must be at most {} characters.", MAX_NAME_LENGTH));
    }
    Ok(trimmed.to_string())
}
