//! TOML Configuration File Support
//!
//! Centralized configuration for the relay and the console, loaded from
//! `~/.config/suggest/suggest.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the binaries through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/suggest/suggest.toml` (typically `~/.config/suggest/suggest.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [upstream]
//! base_url = "http://localhost:11434"
//! model = "llama3.2"
//! connect_timeout_ms = 5000
//! request_timeout_ms = 30000
//! temperature = 0.7
//!
//! [relay]
//! host = "127.0.0.1"
//! port = 3001
//! cors = true
//! max_description_length = 2000
//!
//! [consumer]
//! relay_url = "http://127.0.0.1:3001"
//! content_type = "H5P.Course"
//! open_timeout_ms = 10000
//!
//! [prompts]
//! default_guidance = "Suggest a structure for the content described below."
//!
//! [prompts.guidance]
//! "H5P.Course" = "Propose an ordered list of course sections."
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{ollama_base_url_from_env, SamplingOptions, DEFAULT_OLLAMA_PORT};
use crate::framing::DEFAULT_MAX_LINE_BYTES;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Upstream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamToml {
    /// Base URL of the generation endpoint
    pub base_url: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Response timeout in milliseconds
    pub request_timeout_ms: Option<u64>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Nucleus sampling threshold
    pub top_p: Option<f32>,

    /// Top-k cutoff
    pub top_k: Option<u32>,
}

/// Relay section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayToml {
    /// Listen address
    pub host: Option<String>,

    /// Listen port
    pub port: Option<u16>,

    /// Whether to send permissive CORS headers
    pub cors: Option<bool>,

    /// Maximum description length in characters
    pub max_description_length: Option<usize>,
}

/// Consumer section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerToml {
    /// Base URL of the relay
    pub relay_url: Option<String>,

    /// Content type sent with every submit
    pub content_type: Option<String>,

    /// Timeout for opening the stream in milliseconds
    pub open_timeout_ms: Option<u64>,

    /// Maximum size of a single line in bytes
    pub max_line_bytes: Option<usize>,

    /// Text shown when a request fails before any text arrived
    pub apology: Option<String>,
}

/// Prompts section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsToml {
    /// Guidance used for content types without an entry
    pub default_guidance: Option<String>,

    /// Guidance per content type
    pub guidance: BTreeMap<String, String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestToml {
    /// Upstream configuration section
    pub upstream: UpstreamToml,

    /// Relay configuration section
    pub relay: RelayToml,

    /// Consumer configuration section
    pub consumer: ConsumerToml,

    /// Prompt configuration section
    pub prompts: PromptsToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Upstream generation endpoint settings
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `http://localhost:11434`
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Bound on connection establishment
    pub connect_timeout: Duration,
    /// Bound on a non-streaming call, or on stream headers
    pub request_timeout: Duration,
    /// Sampling parameters
    pub options: SamplingOptions,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: format!("http://localhost:{DEFAULT_OLLAMA_PORT}"),
            model: "llama3.2".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            options: SamplingOptions::default(),
        }
    }
}

/// Relay HTTP surface settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    /// Listen address
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Whether to send permissive CORS headers
    pub cors: bool,
    /// Maximum description length in characters
    pub max_description_length: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            cors: false,
            max_description_length: 2000,
        }
    }
}

/// Stream consumer settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Base URL of the relay
    pub relay_url: String,
    /// Content type sent with every submit
    pub content_type: String,
    /// Bound on opening the stream
    pub open_timeout: Duration,
    /// Maximum size of a single line in bytes
    pub max_line_bytes: usize,
    /// Text shown when a request fails before any text arrived
    pub apology: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:3001".to_string(),
            content_type: "H5P.Course".to_string(),
            open_timeout: Duration::from_secs(10),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            apology: "Sorry, I could not get suggestions right now. Please try again.".to_string(),
        }
    }
}

/// Prompt guidance settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptConfig {
    /// Guidance used for content types without an entry
    pub default_guidance: String,
    /// Guidance per content type
    pub guidance: BTreeMap<String, String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        let mut guidance = BTreeMap::new();
        guidance.insert(
            "H5P.Course".to_string(),
            "Propose an ordered structure of sections for a course. \
             Start with \"Structure:\" and keep each section to one line."
                .to_string(),
        );
        guidance.insert(
            "H5P.QuestionSet".to_string(),
            "Propose a short set of quiz questions with the correct answer marked."
                .to_string(),
        );
        Self {
            default_guidance: "You help authors plan interactive learning content. \
                               Give a concise, structured suggestion."
                .to_string(),
            guidance,
        }
    }
}

/// Centralized configuration
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug, Default)]
pub struct SuggestConfig {
    /// Upstream endpoint
    pub upstream: UpstreamConfig,

    /// Relay HTTP surface
    pub relay: RelayConfig,

    /// Stream consumer
    pub consumer: ConsumerConfig,

    /// Prompt guidance
    pub prompts: PromptConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self::Default
    }
}

impl SuggestConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Address the relay listens on
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.relay.host, self.relay.port)
    }

    /// Check values that would only fail later at runtime
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("upstream.base_url", &self.upstream.base_url),
            ("consumer.relay_url", &self.consumer.relay_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be an http(s) URL, got {url:?}"
                )));
            }
        }
        if self.upstream.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "upstream.model must not be empty".to_string(),
            ));
        }
        if self.upstream.connect_timeout.is_zero()
            || self.upstream.request_timeout.is_zero()
            || self.consumer.open_timeout.is_zero()
        {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if self.relay.max_description_length == 0 {
            return Err(ConfigError::ValidationError(
                "relay.max_description_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/suggest/suggest.toml` or
/// `~/.config/suggest/suggest.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("suggest").join("suggest.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// resulting values are invalid. A missing config file is not an error.
pub fn load_config() -> Result<SuggestConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<SuggestConfig, ConfigError> {
    let mut config = SuggestConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: SuggestToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut SuggestConfig, toml: SuggestToml) {
    // Upstream settings
    if let Some(url) = toml.upstream.base_url {
        config.upstream.base_url = url;
    }
    if let Some(model) = toml.upstream.model {
        config.upstream.model = model;
    }
    if let Some(ms) = toml.upstream.connect_timeout_ms {
        config.upstream.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.upstream.request_timeout_ms {
        config.upstream.request_timeout = Duration::from_millis(ms);
    }
    if toml.upstream.temperature.is_some() {
        config.upstream.options.temperature = toml.upstream.temperature;
    }
    if toml.upstream.top_p.is_some() {
        config.upstream.options.top_p = toml.upstream.top_p;
    }
    if toml.upstream.top_k.is_some() {
        config.upstream.options.top_k = toml.upstream.top_k;
    }

    // Relay settings
    if let Some(host) = toml.relay.host {
        config.relay.host = host;
    }
    if let Some(port) = toml.relay.port {
        config.relay.port = port;
    }
    if let Some(cors) = toml.relay.cors {
        config.relay.cors = cors;
    }
    if let Some(max) = toml.relay.max_description_length {
        config.relay.max_description_length = max;
    }

    // Consumer settings
    if let Some(url) = toml.consumer.relay_url {
        config.consumer.relay_url = url;
    }
    if let Some(content_type) = toml.consumer.content_type {
        config.consumer.content_type = content_type;
    }
    if let Some(ms) = toml.consumer.open_timeout_ms {
        config.consumer.open_timeout = Duration::from_millis(ms);
    }
    if let Some(max) = toml.consumer.max_line_bytes {
        config.consumer.max_line_bytes = max;
    }
    if let Some(apology) = toml.consumer.apology {
        config.consumer.apology = apology;
    }

    // Prompt settings; file entries extend the built-in table
    if let Some(guidance) = toml.prompts.default_guidance {
        config.prompts.default_guidance = guidance;
    }
    config.prompts.guidance.extend(toml.prompts.guidance);
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut SuggestConfig) {
    // Upstream settings from environment
    if let Ok(url) = std::env::var("SUGGEST_UPSTREAM_URL") {
        config.upstream.base_url = url;
        config.source = ConfigSource::Env;
    } else if let Some(url) = ollama_base_url_from_env() {
        config.upstream.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Ok(model) = std::env::var("SUGGEST_MODEL") {
        config.upstream.model = model;
        config.source = ConfigSource::Env;
    }
    if let Ok(timeout) = std::env::var("SUGGEST_CONNECT_TIMEOUT_MS") {
        if let Ok(ms) = timeout.parse::<u64>() {
            config.upstream.connect_timeout = Duration::from_millis(ms);
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(timeout) = std::env::var("SUGGEST_REQUEST_TIMEOUT_MS") {
        if let Ok(ms) = timeout.parse::<u64>() {
            config.upstream.request_timeout = Duration::from_millis(ms);
            config.source = ConfigSource::Env;
        }
    }

    // Relay settings from environment
    if let Ok(host) = std::env::var("SUGGEST_HOST") {
        config.relay.host = host;
        config.source = ConfigSource::Env;
    }
    if let Ok(port) = std::env::var("SUGGEST_PORT") {
        if let Ok(p) = port.parse::<u16>() {
            config.relay.port = p;
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(cors) = std::env::var("SUGGEST_CORS") {
        config.relay.cors = cors != "0" && cors.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }

    // Consumer settings from environment
    if let Ok(url) = std::env::var("SUGGEST_RELAY_URL") {
        config.consumer.relay_url = url;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Upstream base URL override
    pub upstream_url: Option<String>,

    /// Model override
    pub model: Option<String>,

    /// Listen host override
    pub host: Option<String>,

    /// Listen port override
    pub port: Option<u16>,

    /// CORS override
    pub cors: Option<bool>,

    /// Relay URL override (console)
    pub relay_url: Option<String>,

    /// Content type override (console)
    pub content_type: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set upstream URL override
    #[must_use]
    pub fn with_upstream_url(mut self, url: String) -> Self {
        self.upstream_url = Some(url);
        self
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Set listen host override
    #[must_use]
    pub fn with_host(mut self, host: String) -> Self {
        self.host = Some(host);
        self
    }

    /// Set listen port override
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set CORS override
    #[must_use]
    pub fn with_cors(mut self, cors: bool) -> Self {
        self.cors = Some(cors);
        self
    }

    /// Set relay URL override
    #[must_use]
    pub fn with_relay_url(mut self, url: String) -> Self {
        self.relay_url = Some(url);
        self
    }

    /// Set content type override
    #[must_use]
    pub fn with_content_type(mut self, content_type: String) -> Self {
        self.content_type = Some(content_type);
        self
    }

    fn is_empty(&self) -> bool {
        self.upstream_url.is_none()
            && self.model.is_none()
            && self.host.is_none()
            && self.port.is_none()
            && self.cors.is_none()
            && self.relay_url.is_none()
            && self.content_type.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut SuggestConfig) {
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.upstream_url {
            config.upstream.base_url = url.clone();
        }
        if let Some(ref model) = self.model {
            config.upstream.model = model.clone();
        }
        if let Some(ref host) = self.host {
            config.relay.host = host.clone();
        }
        if let Some(port) = self.port {
            config.relay.port = port;
        }
        if let Some(cors) = self.cors {
            config.relay.cors = cors;
        }
        if let Some(ref url) = self.relay_url {
            config.consumer.relay_url = url.clone();
        }
        if let Some(ref content_type) = self.content_type {
            config.consumer.content_type = content_type.clone();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::NamedTempFile;

    const ENV_VARS: &[&str] = &[
        "SUGGEST_UPSTREAM_URL",
        "SUGGEST_MODEL",
        "SUGGEST_CONNECT_TIMEOUT_MS",
        "SUGGEST_REQUEST_TIMEOUT_MS",
        "SUGGEST_HOST",
        "SUGGEST_PORT",
        "SUGGEST_RELAY_URL",
        "SUGGEST_CORS",
        "OLLAMA_HOST",
        "OLLAMA_PORT",
    ];

    /// Serializes tests that touch the process environment
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Take the environment lock and clear every variable config loading reads
    fn clean_env() -> MutexGuard<'static, ()> {
        let guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        guard
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = SuggestConfig::default();

        assert_eq!(config.upstream.base_url, "http://localhost:11434");
        assert_eq!(config.upstream.model, "llama3.2");
        assert_eq!(config.relay.port, 3001);
        assert!(!config.relay.cors);
        assert_eq!(config.consumer.content_type, "H5P.Course");
        assert!(config.prompts.guidance.contains_key("H5P.Course"));
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.ends_with("suggest/suggest.toml"));
        }
    }

    // =========================================================================
    // TOML Parsing Tests
    // =========================================================================

    #[test]
    fn test_parse_valid_toml() {
        let _env = clean_env();
        let file = write_toml(
            r#"
[upstream]
base_url = "http://gpu-box:11434"
model = "qwen2.5:7b"
connect_timeout_ms = 2500
request_timeout_ms = 60000
temperature = 0.2

[relay]
host = "0.0.0.0"
port = 8080
cors = true
max_description_length = 500

[consumer]
relay_url = "http://relay:8080"
content_type = "H5P.QuestionSet"
open_timeout_ms = 3000
apology = "Nope."

[prompts]
default_guidance = "Be brief."

[prompts.guidance]
"H5P.Course" = "Sections only."
"H5P.Timeline" = "Dated events."
"#,
        );

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();

        assert_eq!(config.upstream.base_url, "http://gpu-box:11434");
        assert_eq!(config.upstream.model, "qwen2.5:7b");
        assert_eq!(config.upstream.connect_timeout, Duration::from_millis(2500));
        assert_eq!(config.upstream.request_timeout, Duration::from_secs(60));
        assert_eq!(config.upstream.options.temperature, Some(0.2));

        assert_eq!(config.listen_addr(), "0.0.0.0:8080");
        assert!(config.relay.cors);
        assert_eq!(config.relay.max_description_length, 500);

        assert_eq!(config.consumer.relay_url, "http://relay:8080");
        assert_eq!(config.consumer.content_type, "H5P.QuestionSet");
        assert_eq!(config.consumer.open_timeout, Duration::from_secs(3));
        assert_eq!(config.consumer.apology, "Nope.");

        assert_eq!(config.prompts.default_guidance, "Be brief.");
        assert_eq!(config.prompts.guidance["H5P.Course"], "Sections only.");
        assert_eq!(config.prompts.guidance["H5P.Timeline"], "Dated events.");
        // Built-in entries not named in the file survive
        assert!(config.prompts.guidance.contains_key("H5P.QuestionSet"));

        assert_eq!(config.source(), ConfigSource::File);
    }

    #[test]
    fn test_parse_partial_toml() {
        let _env = clean_env();
        let file = write_toml("[upstream]\nmodel = \"partial-model\"\n");

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();

        assert_eq!(config.upstream.model, "partial-model");
        assert_eq!(config.upstream.base_url, "http://localhost:11434");
        assert_eq!(config.relay.port, 3001);
    }

    #[test]
    fn test_missing_file_graceful() {
        let _env = clean_env();
        let path = PathBuf::from("/nonexistent/path/suggest.toml");
        let config = load_config_from_path(Some(path)).unwrap();

        assert_eq!(config.upstream.model, "llama3.2");
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_malformed_toml_error() {
        let _env = clean_env();
        let file = write_toml("[upstream\nmodel = 3\n");

        let result = load_config_from_path(Some(file.path().to_path_buf()));
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let _env = clean_env();
        let file = write_toml("[upstream]\nbase_url = \"localhost:11434\"\n");

        let result = load_config_from_path(Some(file.path().to_path_buf()));
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(msg) if msg.contains("upstream.base_url")
        ));
    }

    // =========================================================================
    // Priority Ordering Tests
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let _env = clean_env();
        let file = write_toml("[upstream]\nmodel = \"file-model\"\n\n[relay]\nport = 4000\n");

        std::env::set_var("SUGGEST_MODEL", "env-model");
        std::env::set_var("SUGGEST_PORT", "4100");
        std::env::set_var("SUGGEST_CORS", "true");
        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
        for var in ENV_VARS {
            std::env::remove_var(var);
        }

        assert_eq!(config.upstream.model, "env-model");
        assert_eq!(config.relay.port, 4100);
        assert!(config.relay.cors);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_ollama_env_fallback() {
        let _env = clean_env();

        std::env::set_var("OLLAMA_HOST", "gpu-box");
        std::env::set_var("OLLAMA_PORT", "12000");
        let fallback = load_config_from_path(None).unwrap();

        std::env::set_var("SUGGEST_UPSTREAM_URL", "http://explicit:1");
        let explicit = load_config_from_path(None).unwrap();
        for var in ENV_VARS {
            std::env::remove_var(var);
        }

        assert_eq!(fallback.upstream.base_url, "http://gpu-box:12000");
        assert_eq!(explicit.upstream.base_url, "http://explicit:1");
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = SuggestConfig::default();
        config.upstream.model = "env-model".to_string();
        config.set_source(ConfigSource::Env);

        let overrides = ConfigOverrides::new().with_model("cli-model".to_string());
        overrides.apply(&mut config);

        assert_eq!(config.upstream.model, "cli-model");
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    // =========================================================================
    // ConfigOverrides Tests
    // =========================================================================

    #[test]
    fn test_config_overrides_apply() {
        let mut config = SuggestConfig::default();

        ConfigOverrides::new()
            .with_upstream_url("http://other:11434".to_string())
            .with_host("0.0.0.0".to_string())
            .with_port(9000)
            .with_cors(true)
            .with_relay_url("http://other:9000".to_string())
            .with_content_type("H5P.Timeline".to_string())
            .apply(&mut config);

        assert_eq!(config.upstream.base_url, "http://other:11434");
        assert_eq!(config.listen_addr(), "0.0.0.0:9000");
        assert!(config.relay.cors);
        assert_eq!(config.consumer.relay_url, "http://other:9000");
        assert_eq!(config.consumer.content_type, "H5P.Timeline");
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_config_overrides_empty_no_change() {
        let mut config = SuggestConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
        assert_eq!(ConfigSource::File.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }

    #[test]
    fn test_config_error_display() {
        let read_err = ConfigError::ReadError {
            path: PathBuf::from("/test/path"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let msg = read_err.to_string();
        assert!(msg.contains("/test/path"));
        assert!(msg.contains("Failed to read"));
    }
}
