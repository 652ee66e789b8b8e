//! Process configuration from environment variables (`.env` honoured).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::diesel_runtime::DatabaseConfig;
use crate::ingest::{IngestOptions, MissingSource};
use crate::query::{ExecutorLimits, InstructionTemplate, TranslatorConfig};

/// A credential that never shows up in logs or debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "Environment variable {} is not set", var),
            ConfigError::Invalid { var, value, reason } => {
                write!(f, "Invalid value '{}' for {}: {}", value, var, reason)
            }
            ConfigError::Io { path, error } => {
                write!(f, "Cannot read {}: {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Secret,
    pub database: DatabaseConfig,
    pub mistral_api_key: Option<Secret>,
    pub mistral_base_url: String,
    pub mistral_model: String,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,
    pub llm_timeout: Duration,
    pub prompt_path: PathBuf,
    pub data_json_path: PathBuf,
    pub ingest_batch_size: usize,
    pub ingest_fail_on_missing_source: bool,
    pub query_limits: ExecutorLimits,
    pub port: u16,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = DatabaseConfig::default();
        let query_defaults = ExecutorLimits::default();

        Ok(AppConfig {
            database_url: env.database_url()?,
            database: DatabaseConfig {
                max_connections: env.parse_or("DB_MAX_CONNECTIONS", defaults.max_connections)?,
                min_idle: env.parse_or("DB_MIN_IDLE", defaults.min_idle)?,
                connection_timeout_secs: env
                    .parse_or("DB_CONNECTION_TIMEOUT_SECS", defaults.connection_timeout_secs)?,
                ..defaults
            },
            mistral_api_key: env.get("MISTRAL_API_KEY").map(Secret::new),
            mistral_base_url: env
                .get("MISTRAL_BASE_URL")
                .unwrap_or_else(|| "https://api.mistral.ai".to_string()),
            mistral_model: env
                .get("MISTRAL_MODEL")
                .unwrap_or_else(|| "mistral-large-latest".to_string()),
            llm_max_tokens: env.parse_or("LLM_MAX_TOKENS", 500)?,
            llm_temperature: env.parse_or("LLM_TEMPERATURE", 0.1)?,
            llm_timeout: Duration::from_secs(env.parse_or("LLM_TIMEOUT_SECS", 60)?),
            prompt_path: env
                .get("PROMPT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("prompts/system_prompt.txt")),
            data_json_path: env
                .get("DATA_JSON_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/videos.json")),
            ingest_batch_size: env.parse_or("INGEST_BATCH_SIZE", crate::ingest::DEFAULT_BATCH_SIZE)?,
            ingest_fail_on_missing_source: env.flag("INGEST_FAIL_ON_MISSING_SOURCE")?,
            query_limits: ExecutorLimits {
                statement_timeout_ms: env
                    .parse_or("QUERY_TIMEOUT_MS", query_defaults.statement_timeout_ms)?,
                max_scan_rows: env.parse_opt("QUERY_MAX_SCAN_ROWS")?,
            },
            port: env.parse_or("PORT", 8080)?,
        })
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            source: self.data_json_path.clone(),
            batch_size: self.ingest_batch_size,
            missing_source: if self.ingest_fail_on_missing_source {
                MissingSource::Fail
            } else {
                MissingSource::Skip
            },
        }
    }

    pub fn translator_config(&self) -> Result<TranslatorConfig, ConfigError> {
        let api_key = self
            .mistral_api_key
            .clone()
            .ok_or(ConfigError::Missing("MISTRAL_API_KEY"))?;

        Ok(TranslatorConfig {
            api_key,
            base_url: self.mistral_base_url.clone(),
            model: self.mistral_model.clone(),
            max_tokens: self.llm_max_tokens,
            temperature: self.llm_temperature,
            timeout: self.llm_timeout,
        })
    }

    pub fn load_template(&self) -> Result<InstructionTemplate, ConfigError> {
        load_template(&self.prompt_path)
    }
}

fn load_template(path: &Path) -> Result<InstructionTemplate, ConfigError> {
    InstructionTemplate::load(path).map_err(|error| ConfigError::Io {
        path: path.to_path_buf(),
        error,
    })
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, var: &'static str) -> Result<String, ConfigError> {
        self.get(var).ok_or(ConfigError::Missing(var))
    }

    fn parse_opt<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(var) {
            None => Ok(None),
            Some(value) => value.trim().parse().map(Some).map_err(|e: T::Err| {
                ConfigError::Invalid {
                    var,
                    reason: e.to_string(),
                    value,
                }
            }),
        }
    }

    fn parse_or<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.parse_opt(var)?.unwrap_or(default))
    }

    fn flag(&self, var: &'static str) -> Result<bool, ConfigError> {
        match self.get(var) {
            None => Ok(false),
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid {
                    var,
                    value,
                    reason: "expected true or false".to_string(),
                }),
            },
        }
    }

    fn database_url(&self) -> Result<Secret, ConfigError> {
        if let Some(url) = self.get("DATABASE_URL") {
            return Ok(Secret::new(url));
        }

        let user = self.require("POSTGRES_USER")?;
        let password = self.require("POSTGRES_PASSWORD")?;
        let db = self.require("POSTGRES_DB")?;
        let host = self.require("POSTGRES_HOST")?;
        let port: u16 = self.parse_or("POSTGRES_PORT", 5432)?;

        Ok(Secret::new(format!(
            "postgres://{}:{}@{}:{}/{}",
            user, password, host, port, db
        )))
    }
}
