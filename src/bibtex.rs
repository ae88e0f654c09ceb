use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::types::{Authors, Paper, SourceType};

static AUTHOR_SEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+and\s+").unwrap());

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Entry types that carry no bibliographic record.
const NON_ENTRIES: [&str; 3] = ["comment", "string", "preamble"];

/// One `@type{key, field = value, ...}` entry with raw field values.
#[derive(Debug)]
struct Entry {
    kind: String,
    key: String,
    fields: HashMap<String, String>,
}

/// Parse BibTeX text into papers. Malformed entries are skipped and
/// scanning resumes at the next `@`.
pub fn parse(text: &str) -> Vec<Paper> {
    let mut papers = Vec::new();
    let mut pos = 0;
    while let Some(offset) = text[pos..].find('@') {
        let at = pos + offset;
        match parse_entry(text, at) {
            Some((entry, end)) => {
                if let Some(paper) = entry_to_paper(&entry) {
                    papers.push(paper);
                }
                pos = end;
            }
            None => {
                debug!(at, "skipping malformed bibtex entry");
                pos = at + 1;
            }
        }
    }
    papers
}

/// Parse the entry starting at the `@` at `at`; returns the entry and the
/// byte offset just past its closing delimiter.
fn parse_entry(text: &str, at: usize) -> Option<(Entry, usize)> {
    let bytes = text.as_bytes();
    let mut i = at + 1;
    let kind_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    let kind = text[kind_start..i].to_ascii_lowercase();
    if kind.is_empty() {
        return None;
    }
    i = skip_ws(bytes, i);
    let close = match bytes.get(i)? {
        b'{' => b'}',
        b'(' => b')',
        _ => return None,
    };
    let body_start = i + 1;
    let body_end = find_closing(bytes, body_start, close)?;
    let end = body_end + 1;

    if NON_ENTRIES.contains(&kind.as_str()) {
        let entry = Entry {
            kind,
            key: String::new(),
            fields: HashMap::new(),
        };
        return Some((entry, end));
    }

    let body = &text[body_start..body_end];
    let (key, rest) = match body.find(',') {
        Some(comma) => (body[..comma].trim(), &body[comma + 1..]),
        None => (body.trim(), ""),
    };
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    let fields = parse_fields(rest)?;
    let entry = Entry {
        kind,
        key: key.to_string(),
        fields,
    };
    Some((entry, end))
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Index of the delimiter closing an entry body, honouring nested braces.
fn find_closing(bytes: &[u8], start: usize, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' if depth > 0 => depth -= 1,
            _ if b == close && depth == 0 => return Some(start + offset),
            // A new entry while braces are still open means this one is broken.
            b'@' if depth > 0 && starts_entry(&bytes[start + offset..]) => return None,
            _ => {}
        }
    }
    None
}

/// `@word{` at a line start is treated as the beginning of another entry.
fn starts_entry(bytes: &[u8]) -> bool {
    let name_len = bytes[1..]
        .iter()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    name_len > 0 && matches!(bytes.get(1 + name_len), Some(b'{') | Some(b'('))
}

fn parse_fields(body: &str) -> Option<HashMap<String, String>> {
    let bytes = body.as_bytes();
    let mut fields = HashMap::new();
    let mut i = 0;
    loop {
        i = skip_ws(bytes, i);
        if i >= bytes.len() {
            break;
        }
        if bytes[i] == b',' {
            i += 1;
            continue;
        }
        let name_start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || b"_-:".contains(&bytes[i])) {
            i += 1;
        }
        let name = body[name_start..i].to_ascii_lowercase();
        i = skip_ws(bytes, i);
        if name.is_empty() || bytes.get(i) != Some(&b'=') {
            return None;
        }
        let (value, next) = parse_value(body, i + 1)?;
        fields.insert(name, value);
        i = next;
    }
    Some(fields)
}

/// Parse a field value, including `#` concatenation of parts.
fn parse_value(body: &str, start: usize) -> Option<(String, usize)> {
    let bytes = body.as_bytes();
    let mut value = String::new();
    let mut i = start;
    loop {
        i = skip_ws(bytes, i);
        let (part, next) = match bytes.get(i)? {
            b'{' => {
                let end = find_closing(bytes, i + 1, b'}')?;
                (&body[i + 1..end], end + 1)
            }
            b'"' => {
                let end = find_quote(bytes, i + 1)?;
                (&body[i + 1..end], end + 1)
            }
            _ => {
                let end = bytes[i..]
                    .iter()
                    .position(|b| *b == b',' || *b == b'#' || b.is_ascii_whitespace())
                    .map_or(bytes.len(), |p| i + p);
                if end == i {
                    return None;
                }
                (&body[i..end], end)
            }
        };
        value.push_str(part);
        i = skip_ws(bytes, next);
        if bytes.get(i) == Some(&b'#') {
            i += 1;
            continue;
        }
        return Some((value, i));
    }
}

/// Closing `"` at brace depth zero.
fn find_quote(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'"' if depth == 0 => return Some(start + offset),
            _ => {}
        }
    }
    None
}

fn entry_to_paper(entry: &Entry) -> Option<Paper> {
    if NON_ENTRIES.contains(&entry.kind.as_str()) {
        return None;
    }
    let field = |name: &str| entry.fields.get(name).map(|v| clean_value(v));
    let title = field("title").filter(|t| !t.is_empty());
    let Some(title) = title else {
        debug!(key = %entry.key, "bibtex entry without title dropped");
        return None;
    };
    let url = field("url")
        .or_else(|| field("doi").map(|doi| format!("https://doi.org/{doi}")))
        .unwrap_or_default();
    Some(Paper {
        title,
        authors: Authors::Many(field("author").map(|a| split_authors(&a)).unwrap_or_default()),
        year: field("year").unwrap_or_default(),
        abstract_text: field("abstract").unwrap_or_default(),
        url,
        journal: field("journal").or_else(|| field("booktitle")),
        friendly_summary: None,
        source_type: Some(SourceType::Bibtex),
    })
}

/// Drop brace escaping and common LaTeX escapes, collapse whitespace.
fn clean_value(raw: &str) -> String {
    let unbraced: String = raw.chars().filter(|c| *c != '{' && *c != '}').collect();
    let unescaped = unbraced
        .replace("\\&", "&")
        .replace("\\%", "%")
        .replace("\\_", "_")
        .replace("\\$", "$");
    WHITESPACE_RE.replace_all(unescaped.trim(), " ").into_owned()
}

/// Split on "and"; a single part holding a plain comma list ("A, B, C")
/// is split on commas, while "Last, First" stays one name.
fn split_authors(field: &str) -> Vec<String> {
    let parts: Vec<String> = AUTHOR_SEP_RE
        .split(field)
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() == 1 && parts[0].matches(',').count() > 1 {
        return parts[0]
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
    }
    parts
}
