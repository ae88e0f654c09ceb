use thiserror::Error;

/// Faults raised by the backends behind the tool adapter. These never leave
/// `tools`: every adapter operation turns them into a fallback value.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response from {0}")]
    EmptyResponse(&'static str),
    #[error("PDF error: {0}")]
    Pdf(String),
    #[error("pdfium library is not loaded")]
    PdfUnavailable,
}

impl From<ureq::Error> for ToolError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(status) => ToolError::Status {
                status,
                body: String::new(),
            },
            other => ToolError::Http(other.to_string()),
        }
    }
}

/// Fatal startup configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("set DASHSCOPE_API_KEY or QWEN_API_KEY to your model API key")]
    MissingApiKey,
    #[error("invalid log filter '{0}'")]
    LogFilter(String),
}

/// User-input problems caught before the workflow runs. The `Display`
/// text is the corrective message shown to the user.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("I couldn't find search keywords in your request. Try: search for papers on AI in education.")]
    MissingQuery,
    #[error("Please say which paper you mean, e.g. \"summarize paper 1\".")]
    MissingPaperId,
    #[error("Paper id '{0}' is not a number. Try e.g. \"cite paper 1\".")]
    BadPaperId(String),
    #[error("Paper id {id} is out of range: {available} paper(s) are loaded.")]
    PaperOutOfRange { id: String, available: usize },
    #[error("Unsupported citation style: {0}. Supported styles are APA and MLA.")]
    UnsupportedStyle(String),
    #[error("Unknown search method: {0}. Use 'scholarly' or 'llm'.")]
    UnknownSearchMethod(String),
    #[error("Please give the path of a PDF file.")]
    MissingPdfPath,
    #[error("File not found: {0}")]
    PdfNotFound(String),
    #[error("Not a PDF file: {0}")]
    NotPdf(String),
    #[error("No text was provided.")]
    MissingText,
    #[error("That does not look like BibTeX: entries start with '@', e.g. @article{{key, title={{...}}}}.")]
    NotBibtex,
    #[error("Please name the kind of analysis, e.g. descriptive statistics.")]
    MissingDataType,
}
