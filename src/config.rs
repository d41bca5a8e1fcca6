//! Configuration file support for packaging-pal
//!
//! Loads config from ~/.packaging-pal/config.toml and resolves the final
//! settings: CLI args > env vars (handled by clap) > config file > defaults.

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{PalError, Result};
use crate::responses::DEFAULT_BASE_URL;
use crate::search::{DEFAULT_SEARCH_URL, DEFAULT_TIMEOUT_SECS};

pub const DEFAULT_MODEL: &str = "gpt-4.1";
pub const DEFAULT_VECTOR_STORE_ID: &str = "vs_67fd31e9c4c081919a9c34d1be81e2d9";
pub const DEFAULT_TOP_K: usize = 50;
pub const DEFAULT_HITS_FOR_MODEL: usize = 12;
pub const DEFAULT_HISTORY_WINDOW: usize = 20;
pub const DEFAULT_CHAT_MAX_TOKENS: u32 = 1200;
pub const DEFAULT_RECOMMEND_MAX_TOKENS: u32 = 1800;

/// How conversational turns carry earlier context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContinuationMode {
    /// Resend the transcript window every turn
    #[default]
    Transcript,
    /// Send only the new input and chain on previous_response_id
    Chained,
}

/// Configuration file contents (every field optional)
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub model: Option<String>,
    pub search_base_url: Option<String>,
    pub vector_store_id: Option<String>,
    pub top_k: Option<usize>,
    pub hits_for_model: Option<usize>,
    pub history_window: Option<usize>,
    pub chat_max_output_tokens: Option<u32>,
    pub recommend_max_output_tokens: Option<u32>,
    pub search_timeout_secs: Option<u64>,
    pub temperature: Option<f32>,
    pub file_search_on_chat: Option<bool>,
    pub continuation: Option<ContinuationMode>,
    pub system_prompt_file: Option<PathBuf>,
}

impl Config {
    /// Load config from ~/.packaging-pal/config.toml
    pub fn load() -> Self {
        let path = config_path();

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub model: Option<String>,
    pub search_base_url: Option<String>,
    pub vector_store_id: Option<String>,
    pub top_k: Option<usize>,
    pub continuation: Option<ContinuationMode>,
    pub system_prompt_file: Option<PathBuf>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub model: String,
    pub search_base_url: String,
    pub vector_store_id: String,
    pub top_k: usize,
    pub hits_for_model: usize,
    pub history_window: usize,
    pub chat_max_output_tokens: u32,
    pub recommend_max_output_tokens: u32,
    pub search_timeout_secs: u64,
    pub temperature: Option<f32>,
    pub file_search_on_chat: bool,
    pub continuation: ContinuationMode,
    pub system_prompt_file: Option<PathBuf>,
}

impl Settings {
    pub fn resolve(cli: CliOverrides, file: Config) -> Result<Self> {
        let openai_api_key = cli
            .openai_api_key
            .or(file.openai_api_key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                PalError::Config(
                    "OPENAI_API_KEY required (set via --openai-api-key, env var, or ~/.packaging-pal/config.toml)"
                        .into(),
                )
            })?;

        let top_k = cli.top_k.or(file.top_k).unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            return Err(PalError::Config("top_k must be at least 1".into()));
        }

        Ok(Self {
            openai_api_key,
            openai_base_url: cli
                .openai_base_url
                .or(file.openai_base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: cli.model.or(file.model).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            search_base_url: cli
                .search_base_url
                .or(file.search_base_url)
                .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            vector_store_id: cli
                .vector_store_id
                .or(file.vector_store_id)
                .unwrap_or_else(|| DEFAULT_VECTOR_STORE_ID.to_string()),
            top_k,
            hits_for_model: file.hits_for_model.unwrap_or(DEFAULT_HITS_FOR_MODEL),
            history_window: file.history_window.unwrap_or(DEFAULT_HISTORY_WINDOW).max(1),
            chat_max_output_tokens: file.chat_max_output_tokens.unwrap_or(DEFAULT_CHAT_MAX_TOKENS),
            recommend_max_output_tokens: file
                .recommend_max_output_tokens
                .unwrap_or(DEFAULT_RECOMMEND_MAX_TOKENS),
            search_timeout_secs: file.search_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            temperature: file.temperature,
            file_search_on_chat: file.file_search_on_chat.unwrap_or(false),
            continuation: cli.continuation.or(file.continuation).unwrap_or_default(),
            system_prompt_file: cli.system_prompt_file.or(file.system_prompt_file),
        })
    }
}

/// Directory holding config, .env and REPL history
pub fn config_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".packaging-pal")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}
