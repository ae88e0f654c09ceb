use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::bibtex;
use crate::error::ToolError;
use crate::intent;
use crate::llm::{ChatModel, ChatRequest, strip_code_fence};
use crate::pdf::PdfSource;
use crate::scholar::PaperIndex;
use crate::types::{Intent, Paper, PdfAnalysis, PdfParse, SourceType};

pub const DEFAULT_SECTIONS: [&str; 5] = [
    "abstract",
    "introduction",
    "methodology",
    "results",
    "conclusion",
];

/// Characters of PDF text handed to the model for section extraction.
const SECTION_CONTEXT_CHARS: usize = 8000;
/// Characters of PDF text handed to the model for whole-paper analysis.
const ANALYSIS_CONTEXT_CHARS: usize = 12000;

const SUMMARY_SYSTEM: &str =
    "You are an academic assistant. Write a detailed summary of the paper described.";
const FRIENDLY_SYSTEM: &str =
    "You condense paper abstracts into one or two plain, friendly sentences.";
const POLISH_SYSTEM: &str =
    "You are an academic writing assistant. Polish and improve the text you are given.";
const SEARCH_SYSTEM: &str =
    "You are a research librarian with web search. Recommend real, citable academic papers.";
const FORMAT_SYSTEM: &str =
    "You convert literature recommendations into JSON. Answer with JSON only.";
const SECTION_SYSTEM: &str = "You extract sections from academic papers. Answer with JSON only.";
const ANALYSIS_SYSTEM: &str = "You analyse academic papers. Answer with JSON only.";

/// Log a failed tool call and substitute a benign value. Every adapter
/// operation goes through here so nothing below the adapter reaches the
/// workflow as an error.
pub fn fallback<T>(
    op: &'static str,
    result: Result<T, ToolError>,
    default: impl FnOnce(&ToolError) -> T,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(op, error = %e, "tool call failed; using fallback");
            default(&e)
        }
    }
}

/// Uniform, infallible access to the external services.
pub struct Tools {
    llm: Box<dyn ChatModel>,
    index: Box<dyn PaperIndex>,
    pdf: Box<dyn PdfSource>,
    max_results: usize,
}

impl Tools {
    pub fn new(
        llm: Box<dyn ChatModel>,
        index: Box<dyn PaperIndex>,
        pdf: Box<dyn PdfSource>,
        max_results: usize,
    ) -> Self {
        Tools {
            llm,
            index,
            pdf,
            max_results,
        }
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Search the scholarly index, attaching a friendly summary to every hit
    /// that has an abstract.
    pub fn search_by_index(&self, query: &str, max_results: usize) -> Vec<Paper> {
        let hits = fallback("search_by_index", self.index.search(query, max_results), |_| {
            Vec::new()
        });
        debug!(query, hits = hits.len(), "index search finished");
        hits.into_iter()
            .take(max_results)
            .map(|paper| self.with_friendly_summary(paper))
            .collect()
    }

    fn with_friendly_summary(&self, mut paper: Paper) -> Paper {
        if paper.abstract_text.trim().is_empty() {
            return paper;
        }
        let request = ChatRequest::new(
            FRIENDLY_SYSTEM,
            format!(
                "Summarise this abstract in one or two sentences so it is quick to grasp. \
                 Reply with the sentences only.\n\nTitle: {}\nAbstract: {}",
                paper.title, paper.abstract_text
            ),
        )
        .temperature(0.3)
        .max_tokens(200);
        let summary = self.llm.complete(&request).map(Some);
        paper.friendly_summary = fallback("friendly_summary", summary, |_| None);
        paper
    }

    /// Ask the model (with web search) for papers, then have it restate its
    /// own answer as structured records.
    pub fn search_by_llm(&self, query: &str, max_results: usize) -> Vec<Paper> {
        fallback("search_by_llm", self.try_search_by_llm(query, max_results), |_| Vec::new())
    }

    fn try_search_by_llm(&self, query: &str, max_results: usize) -> Result<Vec<Paper>, ToolError> {
        let search = ChatRequest::new(
            SEARCH_SYSTEM,
            format!(
                "Find up to {max_results} academic papers about: {query}\n\
                 For each give the title, authors, year, venue, a short abstract and a URL."
            ),
        )
        .with_web_search();
        let prose = self.llm.complete(&search)?;

        let format = ChatRequest::new(
            FORMAT_SYSTEM,
            format!(
                "Convert the papers below into a JSON array. Each element must have the keys \
                 \"title\", \"authors\" (list of names), \"year\", \"abstract\", \"url\" and \"journal\". \
                 Use empty strings for unknown values. Return only the JSON array.\n\n{prose}"
            ),
        )
        .temperature(0.1);
        let reply = self.llm.complete(&format)?;
        let mut papers = parse_paper_list(&reply)?;
        papers.truncate(max_results);
        for paper in &mut papers {
            paper.source_type = Some(SourceType::Llm);
        }
        Ok(papers)
    }

    pub fn parse_bibtex(&self, text: &str) -> Vec<Paper> {
        let papers = bibtex::parse(text);
        debug!(papers = papers.len(), "parsed bibtex");
        papers
    }

    /// Page text up to `max_pages` (all pages when `None`). Failures give the
    /// zeroed shape with `error` set.
    pub fn parse_pdf(&self, path: &Path, max_pages: Option<usize>) -> PdfParse {
        fallback("parse_pdf", self.pdf.read(path, max_pages), |e| PdfParse {
            error: Some(e.to_string()),
            ..PdfParse::default()
        })
    }

    /// One entry per keyword; sections the model cannot find are empty.
    pub fn extract_pdf_sections(
        &self,
        path: &Path,
        keywords: Option<&[&str]>,
    ) -> BTreeMap<String, String> {
        let keywords = keywords.unwrap_or(&DEFAULT_SECTIONS[..]);
        let parsed = self.parse_pdf(path, None);
        let context = if parsed.error.is_none() {
            prefix(&parsed.text, SECTION_CONTEXT_CHARS)
        } else {
            ""
        };
        keywords
            .iter()
            .map(|keyword| {
                let content = if context.trim().is_empty() {
                    String::new()
                } else {
                    fallback("extract_pdf_section", self.extract_section(context, keyword), |_| {
                        String::new()
                    })
                };
                (keyword.to_string(), content)
            })
            .collect()
    }

    fn extract_section(&self, context: &str, keyword: &str) -> Result<String, ToolError> {
        let request = ChatRequest::new(
            SECTION_SYSTEM,
            format!(
                "From the paper text below, extract the \"{keyword}\" section verbatim. \
                 Return a JSON object {{\"section\": \"{keyword}\", \"content\": \"...\"}}; \
                 use an empty content string if the paper has no such section.\n\n{context}"
            ),
        )
        .temperature(0.1);
        let reply = self.llm.complete(&request)?;
        let section: SectionReply = serde_json::from_str(strip_code_fence(&reply))?;
        Ok(section.content.trim().to_string())
    }

    /// Structured summary of a PDF. Unparseable model output yields a fixed
    /// placeholder record.
    pub fn analyze_pdf_content(&self, path: &Path) -> PdfAnalysis {
        let parsed = self.parse_pdf(path, None);
        if let Some(error) = &parsed.error {
            return PdfAnalysis::unavailable(error);
        }
        if parsed.text.trim().is_empty() {
            return PdfAnalysis::unavailable("the PDF contains no extractable text");
        }
        fallback("analyze_pdf_content", self.try_analyze(&parsed), |e| {
            PdfAnalysis::unavailable(&format!("the model reply could not be used ({e})"))
        })
    }

    fn try_analyze(&self, parsed: &PdfParse) -> Result<PdfAnalysis, ToolError> {
        let request = ChatRequest::new(
            ANALYSIS_SYSTEM,
            format!(
                "Analyse this paper and return a JSON object with the keys \"summary\" (string), \
                 \"key_points\" (list of strings), \"methodology\" (string) and \"findings\" (string).\n\n\
                 Title: {}\n\n{}",
                parsed.title,
                prefix(&parsed.text, ANALYSIS_CONTEXT_CHARS)
            ),
        );
        let reply = self.llm.complete(&request)?;
        Ok(serde_json::from_str(strip_code_fence(&reply))?)
    }

    /// Detailed summary; the friendly summary is preferred over the abstract.
    pub fn summarize_paper(&self, paper: &Paper) -> String {
        let source = paper
            .friendly_summary
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&paper.abstract_text);
        let request = ChatRequest::new(
            SUMMARY_SYSTEM,
            format!(
                "Summarise the following paper in detail.\n\
                 Title: {}\nAuthors: {}\nYear: {}\nAbstract: {}\n\n\
                 Cover:\n1. The main research question\n2. The method\n3. The main findings\n4. Why it matters",
                paper.title, paper.authors, paper.year, source
            ),
        );
        fallback("summarize_paper", self.llm.complete(&request), |_| {
            "The summary could not be generated.".to_string()
        })
    }

    pub fn polish_text(&self, text: &str) -> String {
        let request = ChatRequest::new(
            POLISH_SYSTEM,
            format!(
                "Polish the following academic text:\n{text}\n\n\
                 Requirements:\n1. Keep an academic register\n2. Improve fluency\n\
                 3. Keep the argument coherent\n4. Use standard academic terminology"
            ),
        );
        fallback("polish_text", self.llm.complete(&request), |_| {
            "The text could not be polished.".to_string()
        })
    }

    pub fn classify_intent(&self, user_text: &str) -> Intent {
        let request = ChatRequest::new(intent::SYSTEM_PROMPT, intent::prompt(user_text))
            .temperature(0.2)
            .max_tokens(200);
        fallback(
            "classify_intent",
            self.llm.complete(&request).map(|reply| intent::parse_reply(&reply)),
            |_| Intent::unknown(),
        )
    }
}

#[derive(Deserialize)]
struct SectionReply {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PaperList {
    Bare(Vec<serde_json::Value>),
    Wrapped { papers: Vec<serde_json::Value> },
}

/// Accept a bare JSON array of papers or `{"papers": [...]}`. Elements that
/// do not read as a paper are skipped.
fn parse_paper_list(reply: &str) -> Result<Vec<Paper>, ToolError> {
    let list: PaperList = serde_json::from_str(strip_code_fence(reply))?;
    let items = match list {
        PaperList::Bare(items) | PaperList::Wrapped { papers: items } => items,
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Paper>(item) {
            Ok(paper) => Some(paper),
            Err(e) => {
                debug!(error = %e, "skipping malformed paper record");
                None
            }
        })
        .filter(|p| !p.title.trim().is_empty())
        .collect())
}

/// Longest prefix of `text` with at most `max_chars` characters.
fn prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
pub mod fakes {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::rc::Rc;

    use super::*;

    /// Replays canned replies in order and records every user prompt.
    #[derive(Default)]
    pub struct FakeModel {
        replies: RefCell<VecDeque<Result<String, ToolError>>>,
        prompts: Rc<RefCell<Vec<String>>>,
    }

    impl FakeModel {
        pub fn replying(replies: &[&str]) -> Self {
            let model = FakeModel::default();
            for r in replies {
                model.replies.borrow_mut().push_back(Ok(r.to_string()));
            }
            model
        }

        pub fn push_err(self, err: ToolError) -> Self {
            self.replies.borrow_mut().push_back(Err(err));
            self
        }

        pub fn prompts(&self) -> Rc<RefCell<Vec<String>>> {
            Rc::clone(&self.prompts)
        }
    }

    impl ChatModel for FakeModel {
        fn complete(&self, request: &ChatRequest<'_>) -> Result<String, ToolError> {
            self.prompts.borrow_mut().push(request.user.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(ToolError::EmptyResponse("fake model")))
        }
    }

    pub struct FakeIndex(pub Result<Vec<Paper>, String>);

    impl PaperIndex for FakeIndex {
        fn search(&self, _query: &str, max_results: usize) -> Result<Vec<Paper>, ToolError> {
            match &self.0 {
                Ok(papers) => Ok(papers.iter().take(max_results).cloned().collect()),
                Err(msg) => Err(ToolError::Http(msg.clone())),
            }
        }
    }

    /// Serves fixed page texts for any path.
    pub struct FakePdf(pub Option<Vec<String>>);

    impl PdfSource for FakePdf {
        fn read(&self, path: &Path, max_pages: Option<usize>) -> Result<PdfParse, ToolError> {
            let pages = self.0.clone().ok_or(ToolError::PdfUnavailable)?;
            let count = pages.len();
            let taken = pages.into_iter().take(max_pages.unwrap_or(count)).collect();
            Ok(crate::pdf::assemble(
                crate::pdf::file_title(path),
                BTreeMap::new(),
                count,
                taken,
            ))
        }
    }

    pub fn tools(model: FakeModel, index: FakeIndex, pdf: FakePdf) -> Tools {
        Tools::new(Box::new(model), Box::new(index), Box::new(pdf), 5)
    }

    pub fn llm_only(model: FakeModel) -> Tools {
        tools(model, FakeIndex(Ok(Vec::new())), FakePdf(None))
    }
}
