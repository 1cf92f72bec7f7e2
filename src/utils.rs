//! Utility functions for common operations.

use crate::error::ProviderError;
use regex::Regex;
use scraper::Html;
use std::sync::LazyLock;

/// Leading `<?xml ...?>` declaration, including whitespace before it.
static PROLOGUE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*<\?xml[\s\S]*?\?>").unwrap());

/// Runs of any whitespace.
static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Opening paragraph tag at the start of a cell.
static OPEN_P_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*<(?:[\w.-]+:)?p(?:\s[^<>]*)?>").unwrap());

/// Closing paragraph tag at the end of a cell.
static CLOSE_P_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</(?:[\w.-]+:)?p\s*>\s*$").unwrap());

/// Splits a leading XML declaration off `markup`.
///
/// Returns `(prologue, rest)`; the prologue is empty when there is none.
pub fn split_prologue(markup: &str) -> (&str, &str) {
    match PROLOGUE_REGEX.find(markup) {
        Some(found) => markup.split_at(found.end()),
        None => ("", markup),
    }
}

/// Collapses whitespace runs to single spaces and trims the ends.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text, " ").trim().to_string()
}

/// Strips a leading `<p ...>` and trailing `</p>` from a cell, if present,
/// and collapses whitespace.
///
/// Either tag may be missing when a long paragraph was segmented.
pub fn strip_paragraph_wrapper(cell: &str) -> String {
    let without_open = OPEN_P_REGEX.replace(cell, "");
    let without_close = CLOSE_P_REGEX.replace(&without_open, "");
    collapse_whitespace(&without_close)
}

/// Extracts the visible text of a markup fragment.
pub fn plain_text(fragment: &str) -> String {
    let html = Html::parse_fragment(fragment);
    let text: String = html.root_element().text().collect();
    collapse_whitespace(&text)
}

/// Escapes text for a markup text node or attribute value, encoding every
/// non-ASCII character as a numeric character reference.
pub fn escape_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c if c.is_ascii() => out.push(c),
            c => out.push_str(&format!("&#{};", c as u32)),
        }
    }
    out
}

/// Escapes text for embedding as a plain-text node.
pub fn escape_text(text: &str) -> String {
    quick_xml::escape::partial_escape(text).into_owned()
}

/// Takes the first `n` characters of `text` for log previews.
pub fn preview(text: &str, n: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(n).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Checks if an HTTP response is successful, and if not, returns a detailed error.
///
/// This helper extracts both the status code and response body for better error messages.
pub async fn check_response_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api { status, message });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_prologue() {
        let markup = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<html/>";
        let (prologue, rest) = split_prologue(markup);
        assert_eq!(prologue, "<?xml version=\"1.0\" encoding=\"utf-8\"?>");
        assert_eq!(rest, "\n<html/>");

        assert_eq!(split_prologue("<html/>"), ("", "<html/>"));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  c "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_strip_paragraph_wrapper() {
        assert_eq!(
            strip_paragraph_wrapper("<p class=\"x\">Hello\n  <i>there</i></p>"),
            "Hello <i>there</i>"
        );
        // Segmented cells may carry only one of the tags.
        assert_eq!(strip_paragraph_wrapper("<p>First half. "), "First half.");
        assert_eq!(strip_paragraph_wrapper("second half.</p>"), "second half.");
        // Other tags starting with p are left alone.
        assert_eq!(strip_paragraph_wrapper("<pre>x</pre>"), "<pre>x</pre>");
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(plain_text("Hello <b>bold</b>\n world"), "Hello bold world");
        assert_eq!(plain_text("a &amp; b"), "a & b");
    }

    #[test]
    fn test_escape_ascii() {
        assert_eq!(escape_ascii("Tom & Jerry"), "Tom &amp; Jerry");
        assert_eq!(escape_ascii("三体"), "&#19977;&#20307;");
        assert_eq!(escape_ascii("café <x>"), "caf&#233; &lt;x&gt;");
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a < b & 中"), "a &lt; b &amp; 中");
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("hello", 10), "hello");
        assert_eq!(preview("hello world", 5), "hello...");
    }
}
