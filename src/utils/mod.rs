//! Utility functions and helpers.

pub mod http;

use scraper::Html;
use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Reduce an HTML fragment to its text.
///
/// Text nodes are joined with newlines so `<br>` separated lines survive;
/// `collapse` flattens everything onto one line for titles and usernames.
pub fn extract_text(html: &str, collapse: bool) -> String {
    let fragment = Html::parse_fragment(html);
    let text = fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if collapse {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://www.deviantart.com/notifications/").unwrap();
        assert_eq!(
            resolve_url(&base, "/art/Sketch-42"),
            "https://www.deviantart.com/art/Sketch-42"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_extract_text_keeps_lines() {
        let html = "First line<br/>Second <b>line</b>";
        assert_eq!(extract_text(html, false), "First line\nSecond\nline");
    }

    #[test]
    fn test_extract_text_collapsed() {
        let html = "<a href=\"/u/alice\">Alice</a>\n  <span>(group)</span>";
        assert_eq!(extract_text(html, true), "Alice (group)");
    }

    #[test]
    fn test_extract_text_plain_string() {
        assert_eq!(extract_text("Sunset Study", true), "Sunset Study");
        assert_eq!(extract_text("", true), "");
    }
}
