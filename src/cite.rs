use crate::types::Paper;

const UNKNOWN_AUTHOR: &str = "Unknown Author";
const UNKNOWN_YEAR: &str = "n.d.";
const UNKNOWN_TITLE: &str = "Untitled";

/// Format a reference for `paper`. `apa` and `mla` are supported; any other
/// style gets the short `authors (year). title` form.
pub fn generate_reference(paper: &Paper, style: &str) -> String {
    let authors = or_placeholder(paper.authors.to_string(), UNKNOWN_AUTHOR);
    let year = or_placeholder(paper.year.clone(), UNKNOWN_YEAR);
    let title = or_placeholder(paper.title.clone(), UNKNOWN_TITLE);
    let journal = paper
        .journal
        .as_deref()
        .map(str::trim)
        .filter(|j| !j.is_empty());

    match style.trim().to_ascii_lowercase().as_str() {
        "apa" => match journal {
            Some(j) => format!("{authors} ({year}). {title}. {j}"),
            None => format!("{authors} ({year}). {title}."),
        },
        "mla" => match journal {
            Some(j) => format!("{authors}. \"{title}.\" {j} {year}"),
            None => format!("{authors}. \"{title}.\" {year}"),
        },
        _ => format!("{authors} ({year}). {title}"),
    }
}

/// Required citation fields that are empty.
pub fn check_citation(paper: &Paper) -> Vec<String> {
    let mut missing = Vec::new();
    if paper.title.trim().is_empty() {
        missing.push("title".to_string());
    }
    if paper.authors.is_empty() {
        missing.push("authors".to_string());
    }
    if paper.year.trim().is_empty() {
        missing.push("year".to_string());
    }
    missing
}

fn or_placeholder(value: String, placeholder: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        placeholder.to_string()
    } else {
        trimmed.to_string()
    }
}
