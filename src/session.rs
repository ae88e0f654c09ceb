use std::collections::BTreeMap;

use crate::types::{CitationStyle, Paper, PdfAnalysis, SearchMethod, Task};

/// Conversation state carried across turns. Lives as long as the REPL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub task: Option<Task>,

    // Task inputs
    pub search_query: Option<String>,
    pub search_method: Option<SearchMethod>,
    pub paper_to_summarize_index: Option<usize>,
    pub paper_to_cite_index: Option<usize>,
    pub citation_style: CitationStyle,
    pub bibtex_input: Option<String>,
    pub text_to_polish: Option<String>,
    pub pdf_path: Option<String>,

    /// Replaced only by search and parse tasks.
    pub literature_results: Vec<Paper>,

    // Per-turn outputs
    pub summary: Option<String>,
    pub citations: Option<Vec<String>>,
    pub citation_issues: Option<Vec<String>>,
    pub polished_text: Option<String>,
    pub analysis_results: Option<BTreeMap<String, String>>,
    pub pdf_sections: Option<BTreeMap<String, String>>,
    pub pdf_analysis: Option<PdfAnalysis>,
}

/// The fields a handler changed. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub literature_results: Option<Vec<Paper>>,
    pub summary: Option<String>,
    pub citations: Option<Vec<String>>,
    pub citation_issues: Option<Vec<String>>,
    pub polished_text: Option<String>,
    pub analysis_results: Option<BTreeMap<String, String>>,
    pub pdf_sections: Option<BTreeMap<String, String>>,
    pub pdf_analysis: Option<PdfAnalysis>,
}

impl SessionState {
    /// Merge a handler's patch into the session.
    pub fn apply(&mut self, patch: StatePatch) {
        let StatePatch {
            literature_results,
            summary,
            citations,
            citation_issues,
            polished_text,
            analysis_results,
            pdf_sections,
            pdf_analysis,
        } = patch;
        if let Some(papers) = literature_results {
            self.literature_results = papers;
        }
        merge(&mut self.summary, summary);
        merge(&mut self.citations, citations);
        merge(&mut self.citation_issues, citation_issues);
        merge(&mut self.polished_text, polished_text);
        merge(&mut self.analysis_results, analysis_results);
        merge(&mut self.pdf_sections, pdf_sections);
        merge(&mut self.pdf_analysis, pdf_analysis);
    }

    /// Drop the previous turn's outputs so they cannot leak into this one.
    pub fn clear_outputs(&mut self) {
        self.summary = None;
        self.citations = None;
        self.citation_issues = None;
        self.polished_text = None;
        self.analysis_results = None;
        self.pdf_sections = None;
        self.pdf_analysis = None;
    }

    pub fn finish_turn(&mut self) {
        self.task = None;
    }

    /// Paper at a 0-based index, if in range.
    pub fn paper(&self, index: Option<usize>) -> Option<&Paper> {
        index.and_then(|i| self.literature_results.get(i))
    }
}

fn merge<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_only_touches_patched_fields() {
        let mut state = SessionState {
            summary: Some("old summary".into()),
            literature_results: vec![Paper::default()],
            ..SessionState::default()
        };
        state.apply(StatePatch {
            citations: Some(vec!["c".into()]),
            ..StatePatch::default()
        });
        assert_eq!(state.summary.as_deref(), Some("old summary"));
        assert_eq!(state.literature_results.len(), 1);
        assert_eq!(state.citations, Some(vec!["c".to_string()]));
    }

    #[test]
    fn empty_literature_patch_overwrites() {
        let mut state = SessionState {
            literature_results: vec![Paper::default()],
            ..SessionState::default()
        };
        state.apply(StatePatch {
            literature_results: Some(Vec::new()),
            ..StatePatch::default()
        });
        assert!(state.literature_results.is_empty());
    }

    #[test]
    fn clear_outputs_keeps_inputs_and_results() {
        let mut state = SessionState {
            search_query: Some("q".into()),
            literature_results: vec![Paper::default()],
            summary: Some("s".into()),
            pdf_sections: Some(BTreeMap::new()),
            ..SessionState::default()
        };
        state.clear_outputs();
        assert_eq!(state.summary, None);
        assert_eq!(state.pdf_sections, None);
        assert_eq!(state.search_query.as_deref(), Some("q"));
        assert_eq!(state.literature_results.len(), 1);
    }

    #[test]
    fn paper_lookup_is_bounds_checked() {
        let state = SessionState {
            literature_results: vec![Paper::default()],
            ..SessionState::default()
        };
        assert!(state.paper(Some(0)).is_some());
        assert!(state.paper(Some(1)).is_none());
        assert!(state.paper(None).is_none());
    }
}
