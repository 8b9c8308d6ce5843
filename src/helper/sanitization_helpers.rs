use ammonia::Builder;
use std::collections::HashSet;

/// Cleans rich HTML post content down to a formatting allow-list.
/// Scripts, event handlers and inline styles are removed.
pub fn sanitize_html_content(html_input: &str) -> String {
    let tags_to_allow = [
        "h1", "h2", "h3", "h4", "h5", "h6", "b", "strong", "i", "em", "u", "p", "br",
        "a", "ul", "ol", "li", "blockquote", "code", "pre", "hr", "img", "figure",
        "figcaption", "table", "thead", "tbody", "tr", "th", "td", "s", "del", "span", "div",
    ];
    let safe_tags = tags_to_allow.iter().cloned().collect::<HashSet<_>>();

    let safe_attributes = ["src", "href", "alt", "title", "class", "width", "height"];
    let generic_attributes = safe_attributes.iter().cloned().collect::<HashSet<_>>();

    Builder::new()
        .tags(safe_tags)
        .generic_attributes(generic_attributes)
        .link_rel(Some("nofollow ugc noopener"))
        .clean(html_input)
        .to_string()
}

/// Strips every tag and decodes entities, leaving plain text.
/// Used for titles, excerpts and read-time counting.
pub fn strip_all_html(input: &str) -> String {
    let cleaned = Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string();
    html_escape::decode_html_entities(&cleaned).into_owned()
}
