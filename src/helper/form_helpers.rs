use serde::{Deserialize, Deserializer};

/// Accepts tags either as a JSON array or as one comma-separated string.
pub fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(s) => Ok(normalize_tags(s.split(','))),
        StringOrVec::Vec(v) => Ok(normalize_tags(v)),
    }
}

/// Trims every tag, drops empty ones and keeps the first occurrence of each.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Empty or whitespace-only strings become `None`.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Form {
        #[serde(deserialize_with = "deserialize_tags")]
        tags: Vec<String>,
    }

    #[test]
    fn tags_from_string_or_array() {
        let form: Form = serde_json::from_value(json!({"tags": "rust, actix,,rust "})).unwrap();
        assert_eq!(form.tags, vec!["rust", "actix"]);

        let form: Form = serde_json::from_value(json!({"tags": [" a ", "b", "a"]})).unwrap();
        assert_eq!(form.tags, vec!["a", "b"]);
    }

    #[test]
    fn blank_strings_are_none() {
        assert_eq!(non_empty(Some("  ".into())), None);
        assert_eq!(non_empty(Some(" x ".into())), Some("x".into()));
        assert_eq!(non_empty(None), None);
    }
}
