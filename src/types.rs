use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Author field as it arrives from the various sources: a single
/// preformatted string or a list of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Authors {
    One(String),
    Many(Vec<String>),
}

impl Authors {
    pub fn is_empty(&self) -> bool {
        match self {
            Authors::One(s) => s.trim().is_empty(),
            Authors::Many(names) => names.iter().all(|n| n.trim().is_empty()),
        }
    }
}

impl Default for Authors {
    fn default() -> Self {
        Authors::Many(Vec::new())
    }
}

impl fmt::Display for Authors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authors::One(s) => f.write_str(s),
            Authors::Many(names) => f.write_str(&names.join(", ")),
        }
    }
}

/// Where a paper record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Scholarly,
    Llm,
    Bibtex,
}

/// A bibliographic record. Identity is its position in the session's
/// literature list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    #[serde(default, deserialize_with = "de_text")]
    pub title: String,
    #[serde(default, deserialize_with = "de_authors")]
    pub authors: Authors,
    #[serde(default, deserialize_with = "de_year")]
    pub year: String,
    #[serde(default, rename = "abstract", deserialize_with = "de_text")]
    pub abstract_text: String,
    #[serde(default, deserialize_with = "de_text")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
}

/// `null` reads as an empty string.
fn de_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn de_authors<'de, D>(deserializer: D) -> Result<Authors, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Authors>::deserialize(deserializer)?.unwrap_or_default())
}

/// LLM output sometimes carries the year as a number.
fn de_year<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Workflow task names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Search,
    ParseBibtex,
    ParsePdf,
    AnalyzePdf,
    Summary,
    Writing,
    Analysis,
    References,
    CheckCitation,
}

impl Task {
    pub fn as_str(self) -> &'static str {
        match self {
            Task::Search => "search",
            Task::ParseBibtex => "parse_bibtex",
            Task::ParsePdf => "parse_pdf",
            Task::AnalyzePdf => "analyze_pdf",
            Task::Summary => "summary",
            Task::Writing => "writing",
            Task::Analysis => "analysis",
            Task::References => "references",
            Task::CheckCitation => "check_citation",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    Scholarly,
    Llm,
}

impl FromStr for SearchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scholarly" | "scholar" | "index" => Ok(SearchMethod::Scholarly),
            "llm" | "qwen" | "web" => Ok(SearchMethod::Llm),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CitationStyle {
    #[default]
    Apa,
    Mla,
}

impl CitationStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            CitationStyle::Apa => "apa",
            CitationStyle::Mla => "mla",
        }
    }
}

impl FromStr for CitationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apa" => Ok(CitationStyle::Apa),
            "mla" => Ok(CitationStyle::Mla),
            other => Err(other.to_string()),
        }
    }
}

/// Text and metadata pulled out of a PDF.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PdfParse {
    pub title: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub page_count: usize,
    pub parsed_pages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfAnalysis {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub methodology: String,
    #[serde(default)]
    pub findings: String,
}

impl PdfAnalysis {
    /// Placeholder record used whenever analysis cannot be produced.
    pub fn unavailable(reason: &str) -> Self {
        PdfAnalysis {
            summary: format!("Analysis unavailable: {reason}"),
            key_points: vec!["No key points could be extracted.".to_string()],
            methodology: "Methodology could not be determined.".to_string(),
            findings: "Findings could not be determined.".to_string(),
        }
    }
}

/// Classified purpose of one user utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    Search,
    Summarize,
    Polish,
    Analyze,
    Cite,
    ParseBibtex,
    ParsePdf,
    AnalyzePdf,
    Help,
    Exit,
    Unknown,
}

impl IntentKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "search" => IntentKind::Search,
            "summarize" => IntentKind::Summarize,
            "polish" => IntentKind::Polish,
            "analyze" => IntentKind::Analyze,
            "cite" => IntentKind::Cite,
            "parseBibtex" | "parse_bibtex" => IntentKind::ParseBibtex,
            "parsePdf" | "parse_pdf" => IntentKind::ParsePdf,
            "analyzePdf" | "analyze_pdf" => IntentKind::AnalyzePdf,
            "help" => IntentKind::Help,
            "exit" => IntentKind::Exit,
            "unknown" => IntentKind::Unknown,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub kind: IntentKind,
    pub parameters: BTreeMap<String, String>,
}

impl Intent {
    pub fn unknown() -> Self {
        Intent {
            kind: IntentKind::Unknown,
            parameters: BTreeMap::new(),
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}
