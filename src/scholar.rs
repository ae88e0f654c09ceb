use serde::Deserialize;
use tracing::debug;
use ureq::Agent;

use crate::error::ToolError;
use crate::types::{Authors, Paper, SourceType};

const SEARCH_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const SEARCH_FIELDS: &str = "title,authors,year,abstract,url,venue";

/// A scholarly search index.
pub trait PaperIndex {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<Paper>, ToolError>;
}

/// Semantic Scholar Graph API paper search.
pub struct SemanticScholar {
    agent: Agent,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Vec<HitAuthor>,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    venue: Option<String>,
}

#[derive(Deserialize)]
struct HitAuthor {
    #[serde(default)]
    name: Option<String>,
}

impl SemanticScholar {
    pub fn new(api_key: Option<String>) -> Self {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .build();
        SemanticScholar {
            agent: Agent::new_with_config(config),
            api_key,
        }
    }
}

impl PaperIndex for SemanticScholar {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<Paper>, ToolError> {
        let mut request = self
            .agent
            .get(SEARCH_URL)
            .query("query", query)
            .query("limit", max_results.to_string())
            .query("fields", SEARCH_FIELDS);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let mut resp = request.call()?;
        let status = resp.status();
        let body = resp.body_mut().read_to_string()?;
        if !status.is_success() {
            return Err(ToolError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        let papers = deserialize_search(&body)?;
        debug!(query, hits = papers.len(), "semantic scholar search");
        Ok(papers.into_iter().take(max_results).collect())
    }
}

fn deserialize_search(body: &str) -> Result<Vec<Paper>, ToolError> {
    let data: SearchResponse = serde_json::from_str(body)?;
    Ok(data.data.into_iter().map(convert_hit).collect())
}

fn convert_hit(hit: SearchHit) -> Paper {
    let names = hit
        .authors
        .into_iter()
        .filter_map(|a| a.name)
        .filter(|n| !n.trim().is_empty())
        .collect();
    Paper {
        title: hit.title.unwrap_or_default(),
        authors: Authors::Many(names),
        year: hit.year.map(|y| y.to_string()).unwrap_or_default(),
        abstract_text: hit.abstract_text.unwrap_or_default(),
        url: hit.url.unwrap_or_default(),
        journal: hit.venue.filter(|v| !v.trim().is_empty()),
        friendly_summary: None,
        source_type: Some(SourceType::Scholarly),
    }
}
