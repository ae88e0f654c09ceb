use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::error::InputError;
use crate::session::SessionState;
use crate::tools::Tools;
use crate::types::{CitationStyle, Intent, IntentKind, Paper, SearchMethod, Task};
use crate::workflow::{self, Route};

const WELCOME: &str = "\
Welcome to scholar-assist, an academic research assistant. I can help you:
  1. search for and summarize papers
  2. polish academic writing
  3. load papers from BibTeX and read PDFs
  4. format citations

Describe what you need in plain language, e.g.
  \"find papers on AI in education\" or \"summarize paper 1\".
Type 'help' for more, 'exit' to quit.";

const HELP: &str = "\
Requests I understand:
  search     find papers on a topic            \"find papers on climate models\"
             (add \"using the llm\" for a web-search backed search)
  summarize  summarize a paper from the list   \"summarize paper 2\"
  cite       format a citation (APA or MLA)    \"MLA citation for paper 1\"
             or check its metadata             \"is the citation for paper 1 complete?\"
  polish     improve a piece of writing        \"polish this: ...\"
  bibtex     load papers from BibTeX           \"load this bibtex: @article{...}\"
  pdf        extract sections from a PDF       \"read the sections of ./paper.pdf\"
             or analyse it                     \"analyse ~/papers/draft.pdf\"
  help       show this message
  exit       quit";

const GOODBYE: &str = "Thanks for using scholar-assist. Goodbye!";

enum Flow {
    Continue,
    Exit,
}

/// The read/print loop. Owns the session state for the life of the process.
pub struct Repl<'a, R, W> {
    tools: &'a Tools,
    state: SessionState,
    input: R,
    out: W,
}

impl<'a, R: BufRead, W: Write> Repl<'a, R, W> {
    pub fn new(tools: &'a Tools, input: R, out: W) -> Self {
        Repl {
            tools,
            state: SessionState::default(),
            input,
            out,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        writeln!(self.out, "{WELCOME}")?;
        loop {
            write!(self.out, "\n> ")?;
            self.out.flush()?;
            let Some(line) = self.read_line()? else {
                writeln!(self.out)?;
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Flow::Exit = self.handle(line)? {
                break;
            }
        }
        writeln!(self.out, "{GOODBYE}")?;
        Ok(())
    }

    fn handle(&mut self, line: &str) -> Result<Flow> {
        match line.to_ascii_lowercase().as_str() {
            "exit" => return Ok(Flow::Exit),
            "help" => {
                writeln!(self.out, "{HELP}")?;
                return Ok(Flow::Continue);
            }
            _ => {}
        }

        let intent = self.tools.classify_intent(line);
        debug!(kind = ?intent.kind, params = ?intent.parameters, "classified");
        match intent.kind {
            IntentKind::Exit => return Ok(Flow::Exit),
            IntentKind::Help => writeln!(self.out, "{HELP}")?,
            IntentKind::Unknown => writeln!(
                self.out,
                "Sorry, I didn't understand that. Type 'help' to see what I can do."
            )?,
            _ => match self.prepare(&intent) {
                Ok(Some(task)) => self.execute(task)?,
                Ok(None) => {}
                Err(Prepare::Input(e)) => writeln!(self.out, "{e}")?,
                Err(Prepare::Io(e)) => return Err(e),
            },
        }
        Ok(Flow::Continue)
    }

    /// Turn an intent into session inputs. `Ok(None)` means the user
    /// declined; nothing is written to the session unless a task is returned.
    fn prepare(&mut self, intent: &Intent) -> std::result::Result<Option<Task>, Prepare> {
        let available = self.state.literature_results.len();
        match intent.kind {
            IntentKind::Search => {
                let query = intent.param("query").ok_or(InputError::MissingQuery)?;
                let method = search_method(intent.param("method"))?;
                if !self.confirm(&format!("Search for papers about '{query}'?"))? {
                    writeln!(self.out, "Search cancelled.")?;
                    return Ok(None);
                }
                self.state.search_query = Some(query.to_string());
                self.state.search_method = method;
                Ok(Some(Task::Search))
            }
            IntentKind::Summarize => {
                let index = paper_index(intent.param("paper_id"), available)?;
                if !self.confirm(&format!("Summarize paper {}?", index + 1))? {
                    writeln!(self.out, "Summary cancelled.")?;
                    return Ok(None);
                }
                self.state.paper_to_summarize_index = Some(index);
                Ok(Some(Task::Summary))
            }
            IntentKind::Cite => {
                let index = paper_index(intent.param("paper_id"), available)?;
                if intent.param("validate").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
                    self.state.paper_to_cite_index = Some(index);
                    return Ok(Some(Task::CheckCitation));
                }
                let style = citation_style(intent.param("style"))?;
                self.state.paper_to_cite_index = Some(index);
                self.state.citation_style = style;
                Ok(Some(Task::References))
            }
            IntentKind::Polish => {
                let text = match intent.param("text") {
                    Some(t) => t.to_string(),
                    None => self.ask("Paste the text to polish:")?,
                };
                if text.trim().is_empty() {
                    return Err(InputError::MissingText.into());
                }
                self.state.text_to_polish = Some(text);
                Ok(Some(Task::Writing))
            }
            IntentKind::Analyze => {
                intent.param("data_type").ok_or(InputError::MissingDataType)?;
                Ok(Some(Task::Analysis))
            }
            IntentKind::ParseBibtex => {
                let text = match intent.param("bibtex") {
                    Some(b) => b.to_string(),
                    None => self.ask_block("Paste the BibTeX entries, then an empty line:")?,
                };
                if !text.contains('@') {
                    return Err(InputError::NotBibtex.into());
                }
                self.state.bibtex_input = Some(text);
                Ok(Some(Task::ParseBibtex))
            }
            IntentKind::ParsePdf | IntentKind::AnalyzePdf => {
                let path = pdf_path(intent.param("path"))?;
                self.state.pdf_path = Some(path);
                Ok(Some(if intent.kind == IntentKind::ParsePdf {
                    Task::ParsePdf
                } else {
                    Task::AnalyzePdf
                }))
            }
            IntentKind::Help | IntentKind::Exit | IntentKind::Unknown => Ok(None),
        }
    }

    fn execute(&mut self, task: Task) -> Result<()> {
        debug!(%task, "running workflow");
        self.state.task = Some(task);
        self.state.clear_outputs();
        let route = workflow::run(&mut self.state, self.tools);
        self.render(route)?;
        self.state.finish_turn();
        Ok(())
    }

    fn render(&mut self, route: Route) -> Result<()> {
        let state = &self.state;
        let out = &mut self.out;
        match route {
            Route::SearchIndex | Route::SearchLlm | Route::ParseBibtex => {
                render_papers(out, &state.literature_results)?
            }
            Route::Summarize => {
                let summary = state.summary.as_deref().unwrap_or("No summary was produced.");
                writeln!(out, "\nSummary:\n{summary}")?;
            }
            Route::Cite => {
                writeln!(out, "\nCitation:")?;
                for citation in state.citations.iter().flatten() {
                    writeln!(out, "{citation}")?;
                }
            }
            Route::CheckCitation => match state.citation_issues.as_deref() {
                Some([]) | None => writeln!(out, "The citation metadata is complete.")?,
                Some(issues) => {
                    writeln!(out, "Citation problems:")?;
                    for issue in issues {
                        writeln!(out, "  - {issue}")?;
                    }
                }
            },
            Route::Polish => {
                let text = state
                    .polished_text
                    .as_deref()
                    .unwrap_or("The text could not be polished.");
                writeln!(out, "\nPolished text:\n{text}")?;
            }
            Route::AnalyzeData => {
                let results = state.analysis_results.clone().unwrap_or_default();
                let pretty = serde_json::to_string_pretty(&results)?;
                writeln!(out, "\nAnalysis results:\n{pretty}")?;
            }
            Route::ParsePdf => {
                let sections = state.pdf_sections.clone().unwrap_or_default();
                let found: Vec<_> = sections.iter().filter(|(_, text)| !text.is_empty()).collect();
                if found.is_empty() {
                    writeln!(out, "No sections could be extracted from the PDF.")?;
                }
                for (name, text) in found {
                    writeln!(out, "\n## {name}\n{text}")?;
                }
            }
            Route::AnalyzePdf => {
                if let Some(analysis) = &state.pdf_analysis {
                    writeln!(out, "\nSummary:\n{}", analysis.summary)?;
                    writeln!(out, "\nKey points:")?;
                    for point in &analysis.key_points {
                        writeln!(out, "  - {point}")?;
                    }
                    writeln!(out, "\nMethodology:\n{}", analysis.methodology)?;
                    writeln!(out, "\nFindings:\n{}", analysis.findings)?;
                }
            }
            Route::End => writeln!(
                out,
                "There is nothing to work on yet. Search for papers first."
            )?,
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        write!(self.out, "{question} (y/n): ")?;
        self.out.flush()?;
        let answer = self.read_line()?.unwrap_or_default();
        Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    fn ask(&mut self, prompt: &str) -> Result<String> {
        writeln!(self.out, "{prompt}")?;
        self.out.flush()?;
        Ok(self.read_line()?.unwrap_or_default().trim().to_string())
    }

    /// Read lines until an empty line or end of input.
    fn ask_block(&mut self, prompt: &str) -> Result<String> {
        writeln!(self.out, "{prompt}")?;
        self.out.flush()?;
        let mut block = String::new();
        while let Some(line) = self.read_line()? {
            if line.trim().is_empty() {
                break;
            }
            block.push_str(&line);
        }
        Ok(block)
    }
}

/// Why an intent could not become a task.
enum Prepare {
    Input(InputError),
    Io(anyhow::Error),
}

impl From<InputError> for Prepare {
    fn from(e: InputError) -> Self {
        Prepare::Input(e)
    }
}

impl From<anyhow::Error> for Prepare {
    fn from(e: anyhow::Error) -> Self {
        Prepare::Io(e)
    }
}

impl From<std::io::Error> for Prepare {
    fn from(e: std::io::Error) -> Self {
        Prepare::Io(e.into())
    }
}

fn render_papers(out: &mut impl Write, papers: &[Paper]) -> Result<()> {
    if papers.is_empty() {
        writeln!(out, "Sorry, no papers were found.")?;
        return Ok(());
    }
    writeln!(out, "\nPapers:")?;
    for (i, paper) in papers.iter().enumerate() {
        writeln!(out, "\n{}. {}", i + 1, paper.title)?;
        if !paper.authors.is_empty() {
            writeln!(out, "   Authors: {}", paper.authors)?;
        }
        if !paper.year.is_empty() {
            writeln!(out, "   Year: {}", paper.year)?;
        }
        if let Some(summary) = &paper.friendly_summary {
            writeln!(out, "   In short: {summary}")?;
        }
        if !paper.url.is_empty() {
            writeln!(out, "   {}", paper.url)?;
        }
    }
    Ok(())
}

/// 1-based paper id from the user to a 0-based index.
fn paper_index(raw: Option<&str>, available: usize) -> Result<usize, InputError> {
    let raw = raw.ok_or(InputError::MissingPaperId)?;
    let id: usize = raw
        .trim_start_matches('#')
        .parse()
        .map_err(|_| InputError::BadPaperId(raw.to_string()))?;
    if id == 0 || id > available {
        return Err(InputError::PaperOutOfRange {
            id: raw.to_string(),
            available,
        });
    }
    Ok(id - 1)
}

fn citation_style(raw: Option<&str>) -> Result<CitationStyle, InputError> {
    match raw {
        None => Ok(CitationStyle::default()),
        Some(s) => s.parse().map_err(InputError::UnsupportedStyle),
    }
}

fn search_method(raw: Option<&str>) -> Result<Option<SearchMethod>, InputError> {
    raw.map(|s| s.parse().map_err(InputError::UnknownSearchMethod))
        .transpose()
}

/// The path must name an existing `.pdf` file.
fn pdf_path(raw: Option<&str>) -> Result<String, InputError> {
    let raw = raw
        .map(|p| p.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|p| !p.is_empty())
        .ok_or(InputError::MissingPdfPath)?;
    let path = expand_home(raw);
    if !path.is_file() {
        return Err(InputError::PdfNotFound(raw.to_string()));
    }
    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(InputError::NotPdf(raw.to_string()));
    }
    Ok(path.to_string_lossy().into_owned())
}

/// Resolve a leading `~/` against the home directory.
fn expand_home(raw: &str) -> PathBuf {
    match (raw.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if raw == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw)),
        _ => PathBuf::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::tools::fakes::*;
    use crate::types::Authors;

    fn session(tools: &Tools, input: &str) -> String {
        let mut out = Vec::new();
        Repl::new(tools, Cursor::new(input.to_string()), &mut out)
            .run()
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    fn search_hit(title: &str) -> Paper {
        Paper {
            title: title.into(),
            authors: Authors::Many(vec!["Ada Lovelace".into()]),
            year: "1843".into(),
            journal: Some("Scientific Memoirs".into()),
            ..Paper::default()
        }
    }

    #[test]
    fn help_and_exit_skip_classification() {
        let model = FakeModel::default();
        let prompts = model.prompts();
        let tools = llm_only(model);
        let out = session(&tools, "help\nexit\nnever read\n");
        assert!(out.contains("Requests I understand"));
        assert!(out.ends_with(&format!("{GOODBYE}\n")));
        assert!(prompts.borrow().is_empty());
    }

    #[test]
    fn end_of_input_exits_cleanly() {
        let tools = llm_only(FakeModel::default());
        assert!(session(&tools, "").contains(GOODBYE));
    }

    #[test]
    fn unknown_intent_is_reported() {
        let tools = llm_only(FakeModel::replying(&["no idea"]));
        let out = session(&tools, "blah\n");
        assert!(out.contains("didn't understand"));
    }

    #[test]
    fn search_then_cite_across_turns() {
        let model = FakeModel::replying(&[
            r#"{"intent": "search", "parameters": {"query": "analytical engine"}}"#,
            r#"{"intent": "cite", "parameters": {"paper_id": "1", "style": "mla"}}"#,
        ]);
        let index = FakeIndex(Ok(vec![search_hit("Sketch of the Analytical Engine")]));
        let tools = tools(model, index, FakePdf(None));
        let out = session(&tools, "find papers on the analytical engine\ny\ncite paper 1 in MLA\n");
        assert!(out.contains("1. Sketch of the Analytical Engine"));
        assert!(out.contains(
            "Ada Lovelace. \"Sketch of the Analytical Engine.\" Scientific Memoirs 1843"
        ));
    }

    #[test]
    fn declined_search_runs_nothing() {
        let model = FakeModel::replying(&[r#"{"intent": "search", "parameters": {"query": "x"}}"#]);
        let index = FakeIndex(Err("must not be called".into()));
        let tools = tools(model, index, FakePdf(None));
        let out = session(&tools, "search x\nn\n");
        assert!(out.contains("Search cancelled."));
        assert!(!out.contains("no papers were found"));
    }

    #[test]
    fn out_of_range_paper_is_a_corrective_message() {
        let tools = llm_only(FakeModel::replying(&[
            r#"{"intent": "summarize", "parameters": {"paper_id": 3}}"#,
        ]));
        let out = session(&tools, "summarize paper 3\n");
        assert!(out.contains("Paper id 3 is out of range: 0 paper(s) are loaded."));
    }

    #[test]
    fn bibtex_block_is_read_until_blank_line() {
        let tools = llm_only(FakeModel::replying(&[
            r#"{"intent": "parseBibtex", "parameters": {}}"#,
        ]));
        let input = "load my bibtex\n@article{x,\n  title={Foo},\n  author={Bar}, year={2020}}\n\nexit\n";
        let out = session(&tools, input);
        assert!(out.contains("1. Foo"));
        assert!(out.contains("Authors: Bar"));
    }

    #[test]
    fn paper_index_validation() {
        assert_eq!(paper_index(Some("2"), 3), Ok(1));
        assert_eq!(paper_index(Some("#1"), 1), Ok(0));
        assert_eq!(paper_index(None, 3), Err(InputError::MissingPaperId));
        assert_eq!(
            paper_index(Some("two"), 3),
            Err(InputError::BadPaperId("two".into()))
        );
        assert!(matches!(
            paper_index(Some("0"), 3),
            Err(InputError::PaperOutOfRange { .. })
        ));
        assert!(matches!(
            paper_index(Some("4"), 3),
            Err(InputError::PaperOutOfRange { .. })
        ));
    }

    #[test]
    fn style_validation() {
        assert_eq!(citation_style(None), Ok(CitationStyle::Apa));
        assert_eq!(citation_style(Some("MLA")), Ok(CitationStyle::Mla));
        assert_eq!(
            citation_style(Some("harvard")),
            Err(InputError::UnsupportedStyle("harvard".into()))
        );
    }

    #[test]
    fn pdf_path_validation() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("Paper.PDF");
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, b"notes").unwrap();

        let pdf_str = pdf.to_str().unwrap();
        assert_eq!(pdf_path(Some(pdf_str)), Ok(pdf_str.to_string()));
        assert_eq!(
            pdf_path(Some(txt.to_str().unwrap())),
            Err(InputError::NotPdf(txt.to_str().unwrap().into()))
        );
        let missing = dir.path().join("missing.pdf");
        assert!(matches!(
            pdf_path(Some(missing.to_str().unwrap())),
            Err(InputError::PdfNotFound(_))
        ));
        assert_eq!(pdf_path(Some("  ")), Err(InputError::MissingPdfPath));
    }

    #[test]
    fn tilde_paths_resolve_to_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand_home("~/papers/a.pdf"), home.join("papers/a.pdf"));
        assert_eq!(expand_home("~"), home);
        assert_eq!(expand_home("a~/b.pdf"), PathBuf::from("a~/b.pdf"));
        assert_eq!(
            pdf_path(Some("~/no-such-dir-7f3a/paper.pdf")),
            Err(InputError::PdfNotFound("~/no-such-dir-7f3a/paper.pdf".into()))
        );
    }
}
