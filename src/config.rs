use std::path::PathBuf;

use clap::Args;
use tracing::debug;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Runtime settings. Every flag falls back to its environment variable,
/// which may in turn come from a `.env` file.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// DashScope API key
    #[arg(long, env = "DASHSCOPE_API_KEY", hide_env_values = true)]
    pub dashscope_api_key: Option<String>,

    /// Qwen API key, used when DASHSCOPE_API_KEY is unset
    #[arg(long, env = "QWEN_API_KEY", hide_env_values = true)]
    pub qwen_api_key: Option<String>,

    /// Chat model name
    #[arg(long, env = "QWEN_MODEL_NAME", default_value = "qwen3-235b-a22b")]
    pub model: String,

    /// Sampling temperature for long-form answers
    #[arg(long, env = "QWEN_TEMPERATURE", default_value_t = 0.5)]
    pub temperature: f32,

    /// Output token limit for long-form answers
    #[arg(long, env = "QWEN_MAX_TOKENS", default_value_t = 16384)]
    pub max_tokens: u32,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "QWEN_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Optional Semantic Scholar API key
    #[arg(long, env = "SEMANTIC_SCHOLAR_API_KEY", hide_env_values = true)]
    pub semantic_scholar_api_key: Option<String>,

    /// Papers returned per search
    #[arg(long, env = "SCHOLAR_MAX_RESULTS", default_value_t = 5)]
    pub max_results: usize,

    /// Override pdfium library path
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pub pdfium_path: Option<String>,

    /// Log filter (RUST_LOG syntax); RUST_LOG wins when set
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

/// Connection settings for the chat model.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Settings {
    pub fn llm(&self) -> Result<LlmConfig, ConfigError> {
        let api_key = [&self.dashscope_api_key, &self.qwen_api_key]
            .into_iter()
            .flatten()
            .map(|k| k.trim())
            .find(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        Ok(LlmConfig {
            api_key: api_key.to_string(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }
}

/// Load `.env` from the working directory, then from the user config
/// directory. Existing environment variables are never overridden.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "loaded .env");
    }
    if let Some(path) = user_env_file() {
        if path.is_file() && dotenvy::from_path(&path).is_ok() {
            debug!(path = %path.display(), "loaded user .env");
        }
    }
}

fn user_env_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("scholar-assist").join(".env"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: Settings,
    }

    fn parse(args: &[&str]) -> Settings {
        let mut argv = vec!["scholar-assist"];
        argv.extend_from_slice(args);
        TestCli::parse_from(argv).settings
    }

    #[test]
    fn dashscope_key_preferred() {
        let s = parse(&["--dashscope-api-key", "sk-a", "--qwen-api-key", "sk-b"]);
        assert_eq!(s.llm().unwrap().api_key, "sk-a");
    }

    #[test]
    fn qwen_key_used_when_dashscope_blank() {
        let s = parse(&["--dashscope-api-key", " ", "--qwen-api-key", "sk-b"]);
        assert_eq!(s.llm().unwrap().api_key, "sk-b");
    }

    #[test]
    fn missing_key_is_fatal() {
        let mut s = parse(&["--qwen-api-key", "x"]);
        s.dashscope_api_key = None;
        s.qwen_api_key = None;
        assert!(matches!(s.llm(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn explicit_flags_override_defaults() {
        let s = parse(&[
            "--qwen-api-key",
            "k",
            "--model",
            "qwen-plus",
            "--temperature",
            "0.1",
            "--max-tokens",
            "512",
        ]);
        let llm = s.llm().unwrap();
        assert_eq!(llm.model, "qwen-plus");
        assert_eq!(llm.max_tokens, 512);
        assert!((llm.temperature - 0.1).abs() < f32::EPSILON);
    }
}
