use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LookoutError, Result};

/// Top-level configuration for the Lookout application.
///
/// Loaded from `lookout.toml` by default. Each section corresponds to one
/// crate of the workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookoutConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl LookoutConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LookoutConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, using defaults only if the file
    /// does not exist. A file that exists but cannot be read or parsed is an
    /// error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}; using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let config: LookoutConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| LookoutError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    pub allowed_origins: Vec<String>,
    /// Requests accepted per second across all clients.
    pub rate_limit_per_sec: u64,
    /// Maximum request body size in bytes.
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            allowed_origins: vec![],
            rate_limit_per_sec: 50,
            body_limit_bytes: 64 * 1024,
        }
    }
}

/// Locations of the feed table and encoder/decoder parameter files.
///
/// Relative file names are resolved against `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: String,
    pub feeds_file: String,
    /// Optional JSON schema declaring feed column types. Types are inferred
    /// from the CSV when absent.
    pub feeds_schema_file: Option<String>,
    /// Column holding the unique feed identifier.
    pub feed_id_column: String,
    pub encoder_params_file: String,
    pub encoder_schema_file: String,
    pub decoder_params_file: String,
    pub decoder_schema_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: "Data".to_string(),
            feeds_file: "Table_feeds_v2.csv".to_string(),
            feeds_schema_file: None,
            feed_id_column: "FEED_ID".to_string(),
            encoder_params_file: "encoder_params.json".to_string(),
            encoder_schema_file: "encoder_schema.json".to_string(),
            decoder_params_file: "decoder_params.json".to_string(),
            decoder_schema_file: "decoder_schema.json".to_string(),
        }
    }
}

impl DataConfig {
    /// Resolve a configured file name against the data directory.
    pub fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.data_dir).join(path)
        }
    }
}

/// Chat-completion backend configuration (OpenAI-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    /// Base URL; `/v1/chat/completions` is appended.
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Backoff before the first retry, doubled on each subsequent one.
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.1,
            request_timeout_secs: 60,
            max_retries: 3,
            retry_backoff_ms: 250,
        }
    }
}

/// Conversation and orchestration limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum tool-call rounds before a turn is cut short.
    pub max_tool_rounds: u32,
    /// Wall-clock budget for one turn, including every model call.
    pub turn_timeout_secs: u64,
    /// Idle time after which a session is dropped.
    pub session_timeout_minutes: u32,
    /// Maximum question length in characters.
    pub max_question_chars: usize,
    /// How often the binary sweeps expired sessions.
    pub purge_interval_secs: u64,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 5,
            turn_timeout_secs: 120,
            session_timeout_minutes: 24 * 60,
            max_question_chars: 4000,
            purge_interval_secs: 300,
            system_prompt: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = LookoutConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.server.port, 8000);
        assert!(config.server.allowed_origins.is_empty());
        assert_eq!(config.data.feed_id_column, "FEED_ID");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.chat.max_tool_rounds, 5);
        assert_eq!(config.chat.session_timeout_minutes, 1440);
        assert!(config.chat.system_prompt.is_none());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"

[server]
host = "0.0.0.0"
port = 9001
allowed_origins = ["http://localhost:8501"]

[data]
data_dir = "/srv/lookout"
feeds_schema_file = "feeds_schema.json"

[llm]
model = "gpt-4o"
temperature = 0.0
max_retries = 1

[chat]
max_tool_rounds = 3
turn_timeout_secs = 30
system_prompt = "Be brief."
"#;
        let file = create_temp_config(content);
        let config = LookoutConfig::load(file.path()).unwrap();

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.allowed_origins, vec!["http://localhost:8501"]);
        assert_eq!(config.data.data_dir, "/srv/lookout");
        assert_eq!(
            config.data.feeds_schema_file.as_deref(),
            Some("feeds_schema.json")
        );
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.max_retries, 1);
        assert_eq!(config.chat.max_tool_rounds, 3);
        assert_eq!(config.chat.turn_timeout_secs, 30);
        assert_eq!(config.chat.system_prompt.as_deref(), Some("Be brief."));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config("[server]\nport = 1234\n");
        let config = LookoutConfig::load(file.path()).unwrap();
        assert_eq!(config.server.port, 1234);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.chat.max_tool_rounds, 5);
        assert_eq!(config.data.feeds_file, "Table_feeds_v2.csv");
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is [not valid");
        let result = LookoutConfig::load(file.path());
        assert!(matches!(result, Err(LookoutError::Config(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config =
            LookoutConfig::load_or_default(Path::new("/nonexistent/lookout.toml")).unwrap();
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_load_or_default_rejects_malformed_file() {
        let file = create_temp_config("[server]\nport = \"eight thousand\"\n");
        let result = LookoutConfig::load_or_default(file.path());
        assert!(matches!(result, Err(LookoutError::Config(_))));

        let file = create_temp_config("[server]\nport = 9001\n");
        let config = LookoutConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.server.port, 9001);
    }

    #[test]
    fn test_load_or_default_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            LookoutConfig::load_or_default(dir.path()),
            Err(LookoutError::Io(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lookout.toml");

        let mut config = LookoutConfig::default();
        config.server.port = 7777;
        config.chat.system_prompt = Some("custom".to_string());
        config.save(&path).unwrap();

        let loaded = LookoutConfig::load(&path).unwrap();
        assert_eq!(loaded.server.port, 7777);
        assert_eq!(loaded.chat.system_prompt.as_deref(), Some("custom"));
    }

    // ---- DataConfig::resolve ----

    #[test]
    fn test_resolve_relative_file() {
        let data = DataConfig::default();
        assert_eq!(
            data.resolve("encoder_params.json"),
            Path::new("Data").join("encoder_params.json")
        );
    }

    #[test]
    fn test_resolve_absolute_file() {
        let data = DataConfig::default();
        let abs = std::env::temp_dir().join("feeds.csv");
        assert_eq!(data.resolve(abs.to_str().unwrap()), abs);
    }
}
