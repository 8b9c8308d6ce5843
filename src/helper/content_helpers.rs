use serde_json::Value;

use crate::helper::sanitization_helpers::{sanitize_html_content, strip_all_html};
use crate::models::{ContentInput, RichContent};

pub const WORDS_PER_MINUTE: usize = 200;
pub const EXCERPT_LENGTH: usize = 160;

/// Fixes the content format at write time. HTML is sanitized; a document must
/// be a JSON object.
pub fn normalize_content(input: ContentInput) -> Result<RichContent, String> {
    let content = match input {
        ContentInput::Tagged(content) => content,
        ContentInput::Html(html) => RichContent::Html(html),
        ContentInput::Document(map) => RichContent::Document(Value::Object(map)),
    };

    match content {
        RichContent::Html(html) => {
            let clean = sanitize_html_content(html.trim());
            if strip_all_html(&clean).trim().is_empty() && !clean.contains("<img") {
                return Err("Content must not be empty.".to_string());
            }
            Ok(RichContent::Html(clean))
        }
        RichContent::Document(doc) if doc.is_object() => Ok(RichContent::Document(doc)),
        RichContent::Document(_) => Err("Document content must be a JSON object.".to_string()),
    }
}

fn collect_document_text(node: &Value, out: &mut String) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("text") {
                out.push_str(text);
                out.push(' ');
            }
            if let Some(children) = map.get("content") {
                collect_document_text(children, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_document_text(item, out);
            }
        }
        _ => {}
    }
}

pub fn plain_text(content: &RichContent) -> String {
    match content {
        RichContent::Html(html) => strip_all_html(html),
        RichContent::Document(doc) => {
            let mut text = String::new();
            collect_document_text(doc, &mut text);
            text
        }
    }
}

/// "N min read" at 200 words per minute, never less than one minute.
pub fn estimate_read_time(text: &str) -> String {
    let words = text.split_whitespace().count();
    let minutes = words.div_ceil(WORDS_PER_MINUTE).max(1);
    format!("{} min read", minutes)
}

/// First 160 characters of `text`, cut back to a word boundary.
pub fn derive_excerpt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= EXCERPT_LENGTH {
        return collapsed;
    }

    let head: String = collapsed.chars().take(EXCERPT_LENGTH).collect();
    let cut = match head.rfind(' ') {
        Some(idx) if idx > 0 => &head[..idx],
        _ => head.as_str(),
    };
    format!("{}…", cut.trim_end_matches(|c: char| c.is_ascii_punctuation()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn read_time_rounds_up_with_a_one_minute_floor() {
        assert_eq!(estimate_read_time(""), "1 min read");
        assert_eq!(estimate_read_time(&"word ".repeat(200)), "1 min read");
        assert_eq!(estimate_read_time(&"word ".repeat(201)), "2 min read");
        assert_eq!(estimate_read_time(&"word ".repeat(1000)), "5 min read");
    }

    #[test]
    fn excerpts_break_on_words() {
        assert_eq!(derive_excerpt("  short   text "), "short text");

        let long = "lorem ipsum ".repeat(30);
        let excerpt = derive_excerpt(&long);
        assert!(excerpt.ends_with('…'));
        assert!(excerpt.chars().count() <= EXCERPT_LENGTH + 1);
        assert!(!excerpt.contains("  "));
    }

    #[test]
    fn document_text_is_collected_from_leaves() {
        let doc = RichContent::Document(json!({
            "type": "doc",
            "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "Hello"}]},
                {"type": "paragraph", "content": [{"type": "text", "text": "world"}]}
            ]
        }));
        assert_eq!(plain_text(&doc).split_whitespace().collect::<Vec<_>>(), vec!["Hello", "world"]);
    }

    #[test]
    fn normalize_sanitizes_html_and_rejects_empty_content() {
        let content = normalize_content(ContentInput::Html("<p>ok<script>x()</script></p>".into())).unwrap();
        assert_eq!(content, RichContent::Html("<p>ok</p>".into()));

        assert!(normalize_content(ContentInput::Html("   ".into())).is_err());
        assert!(normalize_content(ContentInput::Tagged(RichContent::Document(json!([1, 2])))).is_err());
    }

    #[test]
    fn normalize_keeps_documents_as_documents() {
        let map = json!({"type": "doc", "content": []}).as_object().cloned().unwrap();
        let content = normalize_content(ContentInput::Document(map)).unwrap();
        assert_eq!(content.format(), "document");
    }
}
