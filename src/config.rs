//! Server configuration loaded from TOML and overridden from the command line.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::args::Args;
use crate::llm_client::LLMClient;
use crate::ollama_llm::OllamaLLM;
use crate::openai_llm::OpenAiLLM;
use crate::service::ServiceSettings;

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Which model backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Ollama,
    #[value(name = "openai")]
    OpenAi,
}

impl Provider {
    fn default_base_url(self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::OpenAi => "https://api.openai.com",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Provider::Ollama => "gemma3:27b",
            Provider::OpenAi => "gpt-4o-2024-08-06",
        }
    }

    fn default_title_model(self) -> Option<&'static str> {
        match self {
            Provider::Ollama => None,
            Provider::OpenAi => Some("gpt-3.5-turbo"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    pub base_url: Option<String>,
    /// Falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// Model for conversation titles; defaults per provider.
    pub title_model: Option<String>,
    pub temperature: Option<f32>,
}

impl LlmConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    pub fn title_model(&self) -> Option<String> {
        self.title_model
            .clone()
            .or_else(|| self.provider.default_title_model().map(str::to_string))
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

/// Complete configuration for the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
            log_level: "info".into(),
        }
    }
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sketch_tutor::config::Config;
    /// # tokio_test::block_on(async {
    /// let cfg = Config::load("tutor.toml").await.unwrap();
    /// println!("{}", cfg.llm.model());
    /// # });
    /// ```
    pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(toml::from_str(&text)?)
    }

    /// Loads the file named by `args` (if any) and applies the overrides.
    pub async fn from_args(args: &Args) -> anyhow::Result<Self> {
        let mut cfg = match &args.config {
            Some(path) => Self::load(path).await?,
            None => Self::default(),
        };
        cfg.apply_args(args);
        Ok(cfg)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(provider) = args.provider {
            self.llm.provider = provider;
        }
        if let Some(model) = &args.model {
            self.llm.model = Some(model.clone());
        }
        if let Some(url) = &args.base_url {
            self.llm.base_url = Some(url.clone());
        }
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
    }

    /// Builds the configured provider client.
    pub fn build_llm(&self) -> anyhow::Result<Arc<dyn LLMClient>> {
        let http = reqwest::Client::new();
        let base_url = self.llm.base_url();
        let model = self.llm.model();
        info!(provider = ?self.llm.provider, %base_url, %model, "using model provider");
        Ok(match self.llm.provider {
            Provider::Ollama => Arc::new(
                OllamaLLM::from_url(&base_url, http, model).map_err(|e| anyhow::anyhow!(e))?,
            ),
            Provider::OpenAi => {
                let key = self.llm.api_key();
                if key.is_none() {
                    warn!("no API key configured; set {API_KEY_ENV} or llm.api_key");
                }
                Arc::new(OpenAiLLM::new(http, base_url, key, model))
            }
        })
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            model: None,
            title_model: self.llm.title_model(),
            temperature: self.llm.temperature,
        }
    }
}
