//! Lyrics extraction from a Genius song page.
//!
//! Lyrics live in one or more `<div data-lyrics-container="true">` blocks.
//! Annotations inside them are plain links and are kept as text; blocks
//! marked `data-exclude-from-selection` (contributor notes, ads) are
//! dropped.

use std::sync::LazyLock;

use regex::Regex;

const CONTAINER_ATTR: &str = "data-lyrics-container=\"true\"";
const EXCLUDE_ATTR: &str = "data-exclude-from-selection=\"true\"";

#[allow(clippy::expect_used)]
fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| regex(r"(?i)<br\s*/?>"));
static TAG: LazyLock<Regex> = LazyLock::new(|| regex(r"<[^>]*>"));
static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| regex(r"\[[^\]\n]*\]"));
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| regex(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);"));

/// Byte range of one `<div ...>...</div>` element.
struct DivSpan {
    /// Start of the opening tag.
    start: usize,
    /// End of the opening tag (exclusive).
    inner_start: usize,
    /// Start of the closing tag.
    inner_end: usize,
    /// End of the closing tag (exclusive).
    end: usize,
}

/// Locate the div whose opening tag contains the byte offset `attr_pos`.
fn enclosing_div(html: &str, attr_pos: usize) -> Option<DivSpan> {
    let start = html[..attr_pos].rfind("<div")?;
    let inner_start = attr_pos + html[attr_pos..].find('>')? + 1;

    let mut depth = 1usize;
    let mut cursor = inner_start;
    while depth > 0 {
        let rest = &html[cursor..];
        let next_open = rest.find("<div");
        let next_close = rest.find("</div")?;
        match next_open {
            Some(open) if open < next_close => {
                depth += 1;
                cursor += open + 4;
            }
            _ => {
                depth -= 1;
                cursor += next_close;
                if depth == 0 {
                    let end = cursor + html[cursor..].find('>')? + 1;
                    return Some(DivSpan {
                        start,
                        inner_start,
                        inner_end: cursor,
                        end,
                    });
                }
                cursor += 5;
            }
        }
    }
    None
}

/// Inner HTML of every div carrying `attr`, in document order.
fn divs_with_attr<'a>(html: &'a str, attr: &str) -> Vec<(DivSpan, &'a str)> {
    let mut found = Vec::new();
    let mut search_from = 0;
    while let Some(offset) = html[search_from..].find(attr) {
        let attr_pos = search_from + offset;
        match enclosing_div(html, attr_pos) {
            Some(span) => {
                let inner = &html[span.inner_start..span.inner_end];
                search_from = span.end;
                found.push((span, inner));
            }
            None => break,
        }
    }
    found
}

fn remove_excluded(html: &str) -> String {
    let mut kept = String::with_capacity(html.len());
    let mut last = 0;
    for (span, _) in divs_with_attr(html, EXCLUDE_ATTR) {
        if span.start >= last {
            kept.push_str(&html[last..span.start]);
            last = span.end;
        }
    }
    kept.push_str(&html[last..]);
    kept
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

/// Convert one container's HTML into plain text lines.
fn container_text(inner: &str) -> String {
    let inner = remove_excluded(inner);
    let with_breaks = LINE_BREAK.replace_all(&inner, "\n");
    let stripped = TAG.replace_all(&with_breaks, "");
    decode_entities(&stripped)
}

/// Remove `[Verse 1]`-style section headers and blank lines.
pub fn remove_section_headers(lyrics: &str) -> String {
    let without = SECTION_HEADER.replace_all(lyrics, "");
    without
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract lyrics text from a song page, `None` when the page carries no
/// lyrics (instrumentals, unreleased songs).
pub fn extract_lyrics(page: &str) -> Option<String> {
    let text = divs_with_attr(page, CONTAINER_ATTR)
        .into_iter()
        .map(|(_, inner)| container_text(inner))
        .collect::<Vec<_>>()
        .join("\n");
    let lyrics = remove_section_headers(&text);
    (!lyrics.is_empty()).then_some(lyrics)
}
