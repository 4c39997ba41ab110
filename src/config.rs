/**
 * Configuration - two-tier load order
 *
 * DESIGN DECISION: built-in defaults, then an optional TOML file, then
 * environment variables, each tier overriding the last
 * WHY: the system needs exactly two audiences - an operator shipping a config
 * file with a deployment, and an operator overriding a single knob at
 * container-start without editing that file. A deeper policy hierarchy has no
 * stakeholder here.
 *
 * PATTERN: layered configuration
 */

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Fully resolved configuration used by every component.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for persisted output (context packages, code maps, caches).
    pub output_dir: PathBuf,
    /// Only project paths under this root may be processed.
    pub allowed_project_root: PathBuf,
    /// Log level passed to `tracing_subscriber::EnvFilter`.
    pub log_level: String,

    pub llm: LlmConfig,
    pub codemap: CodeMapConfig,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub default_model: String,
    pub task_model_map: HashMap<String, String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_secs: u64,
    pub retry_cap_secs: u64,
    pub gateway_concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct CodeMapConfig {
    pub max_age_minutes: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.example.com/v1/chat/completions".to_string(),
            api_key: None,
            default_model: "default-model".to_string(),
            task_model_map: HashMap::new(),
            timeout_secs: 30,
            max_retries: 3,
            retry_base_secs: 1,
            retry_cap_secs: 4,
            gateway_concurrency: 8,
        }
    }
}

impl Default for CodeMapConfig {
    fn default() -> Self {
        Self { max_age_minutes: 60 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            allowed_project_root: PathBuf::from("."),
            log_level: "info".to_string(),
            llm: LlmConfig::default(),
            codemap: CodeMapConfig::default(),
        }
    }
}

/// Shape of the optional TOML file named by `LLM_CONFIG_PATH`. Every field is
/// optional; a missing file, or a missing field within a present file, falls
/// back to `Config::default()`.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    output_dir: Option<String>,
    allowed_project_root: Option<String>,
    log_level: Option<String>,
    llm_endpoint: Option<String>,
    llm_api_key: Option<String>,
    llm_default_model: Option<String>,
    #[serde(default)]
    llm_task_model_map: HashMap<String, String>,
    llm_timeout_secs: Option<u64>,
    llm_max_retries: Option<u32>,
    llm_retry_base_secs: Option<u64>,
    llm_retry_cap_secs: Option<u64>,
    llm_gateway_concurrency: Option<usize>,
    codemap_max_age_minutes: Option<u32>,
}

impl Config {
    /// Loads defaults, merges an optional TOML file, then applies environment
    /// overrides. Never fails on a missing file - only malformed TOML, an
    /// unreadable-but-present file, or an invalid environment value are errors.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(path) = std::env::var("LLM_CONFIG_PATH") {
            config.merge_file(Path::new(&path))?;
        }

        config.apply_env();
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Ok(()), // missing file is not an error
        };
        let file: FileConfig = toml::from_str(&contents)
            .map_err(|e| Error::InvalidInput(format!("malformed config file: {e}")))?;

        if let Some(v) = file.output_dir {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = file.allowed_project_root {
            self.allowed_project_root = PathBuf::from(v);
        }
        if let Some(v) = file.log_level {
            self.log_level = v;
        }
        if let Some(v) = file.llm_endpoint {
            self.llm.endpoint = v;
        }
        if file.llm_api_key.is_some() {
            self.llm.api_key = file.llm_api_key;
        }
        if let Some(v) = file.llm_default_model {
            self.llm.default_model = v;
        }
        for (k, v) in file.llm_task_model_map {
            self.llm.task_model_map.insert(k, v);
        }
        if let Some(v) = file.llm_timeout_secs {
            self.llm.timeout_secs = v;
        }
        if let Some(v) = file.llm_max_retries {
            self.llm.max_retries = v;
        }
        if let Some(v) = file.llm_retry_base_secs {
            self.llm.retry_base_secs = v;
        }
        if let Some(v) = file.llm_retry_cap_secs {
            self.llm.retry_cap_secs = v;
        }
        if let Some(v) = file.llm_gateway_concurrency {
            self.llm.gateway_concurrency = v;
        }
        if let Some(v) = file.codemap_max_age_minutes {
            self.codemap.max_age_minutes = v;
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ALLOWED_PROJECT_ROOT") {
            self.allowed_project_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("LLM_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.llm.timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("LLM_MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                self.llm.max_retries = n;
            }
        }
        if let Ok(v) = std::env::var("GATEWAY_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.llm.gateway_concurrency = n;
            }
        }
        if let Ok(v) = std::env::var("CODEMAP_MAX_AGE_MINUTES") {
            if let Ok(n) = v.parse() {
                self.codemap.max_age_minutes = n;
            }
        }
    }
}
