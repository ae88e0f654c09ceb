use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::cite;
use crate::session::{SessionState, StatePatch};
use crate::tools::Tools;
use crate::types::{PdfAnalysis, SearchMethod, Task};

const NO_PAPER_SUMMARY: &str =
    "Cannot summarize: search for papers first or give a valid paper number.";
const NO_PAPER_CITATION: &str =
    "Cannot generate a citation: search for papers first or give a valid paper number.";
const NO_PAPER_CHECK: &str =
    "Cannot check the citation: search for papers first or give a valid paper number.";
const NO_TEXT: &str = "No text to polish was provided.";
const NO_DATASET: &str =
    "Data analysis needs a loaded dataset, and dataset loading is not available yet.";

/// Handler chosen for one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SearchIndex,
    SearchLlm,
    ParseBibtex,
    ParsePdf,
    AnalyzePdf,
    Summarize,
    Cite,
    CheckCitation,
    Polish,
    AnalyzeData,
    End,
}

/// Pick the handler for the session's current task.
pub fn route(state: &SessionState) -> Route {
    let has_papers = !state.literature_results.is_empty();
    let route = match state.task {
        Some(Task::Search) => match state.search_method {
            Some(SearchMethod::Llm) => Route::SearchLlm,
            Some(SearchMethod::Scholarly) | None => Route::SearchIndex,
        },
        Some(Task::ParseBibtex) => Route::ParseBibtex,
        Some(Task::ParsePdf) => Route::ParsePdf,
        Some(Task::AnalyzePdf) => Route::AnalyzePdf,
        Some(Task::Summary) if has_papers => Route::Summarize,
        Some(Task::References) if has_papers => Route::Cite,
        Some(Task::CheckCitation) if has_papers => Route::CheckCitation,
        Some(Task::Writing) => Route::Polish,
        Some(Task::Analysis) => Route::AnalyzeData,
        Some(Task::Summary | Task::References | Task::CheckCitation) | None => Route::End,
    };
    debug!(task = ?state.task, ?route, "routed");
    route
}

/// Run the handler for `route` and return its patch.
pub fn dispatch(route: Route, state: &SessionState, tools: &Tools) -> StatePatch {
    match route {
        Route::SearchIndex => search_index_node(state, tools),
        Route::SearchLlm => search_llm_node(state, tools),
        Route::ParseBibtex => parse_bibtex_node(state, tools),
        Route::ParsePdf => parse_pdf_node(state, tools),
        Route::AnalyzePdf => analyze_pdf_node(state, tools),
        Route::Summarize => summarize_node(state, tools),
        Route::Cite => cite_node(state, tools),
        Route::CheckCitation => check_citation_node(state, tools),
        Route::Polish => polish_node(state, tools),
        Route::AnalyzeData => analyze_data_node(state, tools),
        Route::End => StatePatch::default(),
    }
}

/// One workflow invocation: route, run at most one handler, merge its patch.
pub fn run(state: &mut SessionState, tools: &Tools) -> Route {
    let route = route(state);
    if route != Route::End {
        let patch = dispatch(route, state, tools);
        state.apply(patch);
    }
    route
}

fn query(state: &SessionState) -> Option<&str> {
    state
        .search_query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
}

pub fn search_index_node(state: &SessionState, tools: &Tools) -> StatePatch {
    let Some(query) = query(state) else {
        debug!("index search without a query");
        return literature(Vec::new());
    };
    literature(tools.search_by_index(query, tools.max_results()))
}

pub fn search_llm_node(state: &SessionState, tools: &Tools) -> StatePatch {
    let Some(query) = query(state) else {
        debug!("llm search without a query");
        return literature(Vec::new());
    };
    literature(tools.search_by_llm(query, tools.max_results()))
}

pub fn parse_bibtex_node(state: &SessionState, tools: &Tools) -> StatePatch {
    match state.bibtex_input.as_deref().filter(|b| !b.trim().is_empty()) {
        Some(input) => literature(tools.parse_bibtex(input)),
        None => literature(Vec::new()),
    }
}

pub fn parse_pdf_node(state: &SessionState, tools: &Tools) -> StatePatch {
    let sections = match state.pdf_path.as_deref() {
        Some(path) => tools.extract_pdf_sections(Path::new(path), None),
        None => BTreeMap::new(),
    };
    StatePatch {
        pdf_sections: Some(sections),
        ..StatePatch::default()
    }
}

pub fn analyze_pdf_node(state: &SessionState, tools: &Tools) -> StatePatch {
    let analysis = match state.pdf_path.as_deref() {
        Some(path) => tools.analyze_pdf_content(Path::new(path)),
        None => PdfAnalysis::unavailable("no PDF path was given"),
    };
    StatePatch {
        pdf_analysis: Some(analysis),
        ..StatePatch::default()
    }
}

pub fn summarize_node(state: &SessionState, tools: &Tools) -> StatePatch {
    let summary = match state.paper(state.paper_to_summarize_index) {
        Some(paper) => tools.summarize_paper(paper),
        None => NO_PAPER_SUMMARY.to_string(),
    };
    StatePatch {
        summary: Some(summary),
        ..StatePatch::default()
    }
}

pub fn cite_node(state: &SessionState, _tools: &Tools) -> StatePatch {
    let citation = match state.paper(state.paper_to_cite_index) {
        Some(paper) => cite::generate_reference(paper, state.citation_style.as_str()),
        None => NO_PAPER_CITATION.to_string(),
    };
    StatePatch {
        citations: Some(vec![citation]),
        ..StatePatch::default()
    }
}

pub fn check_citation_node(state: &SessionState, _tools: &Tools) -> StatePatch {
    let issues = match state.paper(state.paper_to_cite_index) {
        Some(paper) => cite::check_citation(paper)
            .into_iter()
            .map(|field| format!("missing {field}"))
            .collect(),
        None => vec![NO_PAPER_CHECK.to_string()],
    };
    StatePatch {
        citation_issues: Some(issues),
        ..StatePatch::default()
    }
}

pub fn polish_node(state: &SessionState, tools: &Tools) -> StatePatch {
    let polished = match state.text_to_polish.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(text) => tools.polish_text(text),
        None => NO_TEXT.to_string(),
    };
    StatePatch {
        polished_text: Some(polished),
        ..StatePatch::default()
    }
}

pub fn analyze_data_node(_state: &SessionState, _tools: &Tools) -> StatePatch {
    let results = BTreeMap::from([("status".to_string(), NO_DATASET.to_string())]);
    StatePatch {
        analysis_results: Some(results),
        ..StatePatch::default()
    }
}

fn literature(papers: Vec<crate::types::Paper>) -> StatePatch {
    StatePatch {
        literature_results: Some(papers),
        ..StatePatch::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fakes::*;
    use crate::types::{Authors, CitationStyle, Paper, SourceType};

    fn paper() -> Paper {
        Paper {
            title: "T".into(),
            authors: Authors::One("A".into()),
            year: "2024".into(),
            journal: Some("J".into()),
            ..Paper::default()
        }
    }

    fn with_task(task: Task) -> SessionState {
        SessionState {
            task: Some(task),
            ..SessionState::default()
        }
    }

    #[test]
    fn search_routes_by_method() {
        let mut state = with_task(Task::Search);
        assert_eq!(route(&state), Route::SearchIndex);
        state.search_method = Some(SearchMethod::Llm);
        assert_eq!(route(&state), Route::SearchLlm);
        state.search_method = Some(SearchMethod::Scholarly);
        assert_eq!(route(&state), Route::SearchIndex);
    }

    #[test]
    fn simple_routes() {
        assert_eq!(route(&with_task(Task::ParseBibtex)), Route::ParseBibtex);
        assert_eq!(route(&with_task(Task::ParsePdf)), Route::ParsePdf);
        assert_eq!(route(&with_task(Task::AnalyzePdf)), Route::AnalyzePdf);
        assert_eq!(route(&with_task(Task::Writing)), Route::Polish);
        assert_eq!(route(&with_task(Task::Analysis)), Route::AnalyzeData);
        assert_eq!(route(&SessionState::default()), Route::End);
    }

    #[test]
    fn paper_tasks_need_results() {
        for task in [Task::Summary, Task::References, Task::CheckCitation] {
            assert_eq!(route(&with_task(task)), Route::End);
        }
        let mut state = with_task(Task::Summary);
        state.literature_results = vec![paper()];
        assert_eq!(route(&state), Route::Summarize);
        state.task = Some(Task::References);
        assert_eq!(route(&state), Route::Cite);
        state.task = Some(Task::CheckCitation);
        assert_eq!(route(&state), Route::CheckCitation);
    }

    #[test]
    fn summary_without_results_leaves_state_unchanged() {
        let model = FakeModel::replying(&["should not be used"]);
        let prompts = model.prompts();
        let tools = llm_only(model);
        let mut state = with_task(Task::Summary);
        state.paper_to_summarize_index = Some(0);
        let before = state.clone();
        assert_eq!(run(&mut state, &tools), Route::End);
        assert_eq!(state, before);
        assert!(prompts.borrow().is_empty());
    }

    #[test]
    fn references_end_to_end() {
        let tools = llm_only(FakeModel::default());
        let mut state = SessionState {
            task: Some(Task::References),
            paper_to_cite_index: Some(0),
            citation_style: CitationStyle::Apa,
            literature_results: vec![paper()],
            ..SessionState::default()
        };
        assert_eq!(run(&mut state, &tools), Route::Cite);
        assert_eq!(state.citations, Some(vec!["A (2024). T. J".to_string()]));
    }

    #[test]
    fn parse_bibtex_end_to_end() {
        let tools = llm_only(FakeModel::default());
        let mut state = SessionState {
            task: Some(Task::ParseBibtex),
            bibtex_input: Some("@article{x, title={Foo}, author={Bar}, year={2020}}".into()),
            ..SessionState::default()
        };
        run(&mut state, &tools);
        assert_eq!(state.literature_results.len(), 1);
        let p = &state.literature_results[0];
        assert_eq!(p.title, "Foo");
        assert_eq!(p.authors, Authors::Many(vec!["Bar".into()]));
        assert_eq!(p.year, "2020");
        assert_eq!(p.source_type, Some(SourceType::Bibtex));
    }

    #[test]
    fn out_of_range_indices_explain_instead_of_panicking() {
        let tools = llm_only(FakeModel::default());
        let state = SessionState {
            literature_results: vec![paper()],
            paper_to_summarize_index: Some(3),
            paper_to_cite_index: Some(1),
            ..SessionState::default()
        };
        assert_eq!(
            summarize_node(&state, &tools).summary.as_deref(),
            Some(NO_PAPER_SUMMARY)
        );
        assert_eq!(
            cite_node(&state, &tools).citations,
            Some(vec![NO_PAPER_CITATION.to_string()])
        );
        let empty = SessionState::default();
        assert!(summarize_node(&empty, &tools).summary.is_some());
        assert_eq!(
            check_citation_node(&empty, &tools).citation_issues,
            Some(vec![NO_PAPER_CHECK.to_string()])
        );
    }

    #[test]
    fn handlers_return_only_their_fields() {
        let tools = llm_only(FakeModel::replying(&["polished!"]));
        let state = SessionState {
            text_to_polish: Some("rough draft".into()),
            ..SessionState::default()
        };
        let patch = polish_node(&state, &tools);
        assert_eq!(
            patch,
            StatePatch {
                polished_text: Some("polished!".into()),
                ..StatePatch::default()
            }
        );
    }

    #[test]
    fn search_overwrites_results() {
        let index = FakeIndex(Ok(vec![paper(), paper()]));
        let tools = tools(FakeModel::default(), index, FakePdf(None));
        let mut state = with_task(Task::Search);
        state.search_query = Some("  ".into());
        state.literature_results = vec![paper()];
        run(&mut state, &tools);
        assert!(state.literature_results.is_empty());

        state.search_query = Some("transformers".into());
        run(&mut state, &tools);
        assert_eq!(state.literature_results.len(), 2);
    }

    #[test]
    fn missing_inputs_give_safe_defaults() {
        let tools = llm_only(FakeModel::default());
        let empty = SessionState::default();
        assert_eq!(parse_bibtex_node(&empty, &tools).literature_results, Some(vec![]));
        assert_eq!(parse_pdf_node(&empty, &tools).pdf_sections, Some(BTreeMap::new()));
        assert!(analyze_pdf_node(&empty, &tools).pdf_analysis.is_some());
        assert_eq!(polish_node(&empty, &tools).polished_text.as_deref(), Some(NO_TEXT));
        assert!(analyze_data_node(&empty, &tools)
            .analysis_results
            .is_some_and(|r| r.contains_key("status")));
    }

    #[test]
    fn check_citation_lists_missing_fields() {
        let tools = llm_only(FakeModel::default());
        let state = SessionState {
            literature_results: vec![Paper {
                year: String::new(),
                ..paper()
            }],
            paper_to_cite_index: Some(0),
            ..SessionState::default()
        };
        assert_eq!(
            check_citation_node(&state, &tools).citation_issues,
            Some(vec!["missing year".to_string()])
        );
    }
}
