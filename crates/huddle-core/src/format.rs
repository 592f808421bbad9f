//! Message body formatting.
//!
//! User text is HTML-escaped and URL-like tokens are wrapped in anchors
//! before anything reaches a subscriber or the archive.

use regex::Regex;
use std::sync::LazyLock;

/// Permissive URL matcher: explicit schemes, or bare host names ending in
/// a well-known TLD or any two-letter country code.
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:(?:https?|ftp)://[^\s<>"']+|(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+(?:com|net|org|edu|gov|mil|int|info|biz|name|pro|io|dev|app|xyz|online|site|tech|store|blog|cloud|[a-z]{2})\b(?::\d{1,5})?(?:/[^\s<>"']*)?)"#,
    )
    .expect("URL pattern is valid")
});

/// Characters dropped from the end of a detected link.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']'];

/// Escape the five HTML-significant characters.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Find URL-like substrings, as byte ranges into `text`.
#[must_use]
pub fn find_links(text: &str) -> Vec<(usize, usize)> {
    URL_PATTERN
        .find_iter(text)
        .filter_map(|m| {
            let link = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
            (!link.is_empty()).then(|| (m.start(), m.start() + link.len()))
        })
        .collect()
}

/// Escape `text` and turn every detected link into a clickable anchor.
///
/// A link without an `http` prefix gets `http://` in its `href`; the
/// visible anchor text stays as the user typed it.
#[must_use]
pub fn format_message(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0;

    for (start, end) in find_links(text) {
        out.push_str(&escape_html(&text[last..start]));

        let link = &text[start..end];
        let display = escape_html(link);
        let has_scheme = link
            .get(..4)
            .is_some_and(|p| p.eq_ignore_ascii_case("http"));
        let href = if has_scheme {
            display.clone()
        } else {
            format!("http://{display}")
        };
        out.push_str(&format!(
            r#"<a href="{href}" target="_blank">{display}</a>"#
        ));

        last = end;
    }

    out.push_str(&escape_html(&text[last..]));
    out
}
