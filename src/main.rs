mod bibtex;
mod cite;
mod config;
mod error;
mod intent;
mod llm;
mod pdf;
mod repl;
mod scholar;
mod session;
mod tools;
mod types;
mod workflow;

use std::io;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Settings;
use error::ConfigError;
use llm::OpenAiCompatible;
use pdf::PdfiumSource;
use repl::Repl;
use scholar::SemanticScholar;
use tools::Tools;

#[derive(Parser)]
#[command(
    name = "scholar-assist",
    version,
    about = "Conversational assistant for literature search, summaries, citations and PDF reading"
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,
}

fn main() -> Result<()> {
    config::load_dotenv();
    let cli = Cli::parse();
    init_logging(&cli.settings.log_level)?;

    let settings = cli.settings;
    let llm_config = settings.llm()?;
    info!(model = %llm_config.model, base_url = %llm_config.base_url, "starting");

    let tools = Tools::new(
        Box::new(OpenAiCompatible::new(&llm_config)),
        Box::new(SemanticScholar::new(settings.semantic_scholar_api_key.clone())),
        Box::new(PdfiumSource::load(settings.pdfium_path.as_deref())),
        settings.max_results,
    );

    let stdin = io::stdin();
    Repl::new(&tools, stdin.lock(), io::stdout()).run()
}

/// RUST_LOG wins over `--log-level`. Logs go to stderr so they never mix
/// with the conversation on stdout.
fn init_logging(level: &str) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|_| ConfigError::LogFilter(level.to_string()))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
    Ok(())
}
