//! CLI argument definitions for the Lookout server.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::Parser;
use lookout_core::LookoutConfig;

pub const CONFIG_ENV: &str = "LOOKOUT_CONFIG";
pub const PORT_ENV: &str = "LOOKOUT_PORT";
const DEFAULT_CONFIG_FILE: &str = "lookout.toml";

/// Lookout - ask questions about camera feeds and codec settings.
#[derive(Parser, Debug, Default)]
#[command(name = "lookout", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Directory holding the feed table and parameter files.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Priority: --config flag > LOOKOUT_CONFIG > ./lookout.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.config_path_from(std::env::var(CONFIG_ENV).ok())
    }

    fn config_path_from(&self, env: Option<String>) -> PathBuf {
        if let Some(path) = &self.config {
            return path.clone();
        }
        match env.filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Overlay CLI flags and env vars onto the loaded file config.
    pub fn apply(&self, config: &mut LookoutConfig) {
        self.apply_with_env(config, std::env::var(PORT_ENV).ok());
    }

    fn apply_with_env(&self, config: &mut LookoutConfig, port_env: Option<String>) {
        if let Some(port) = self.port {
            config.server.port = port;
        } else if let Some(port) = port_env.and_then(|p| p.trim().parse::<u16>().ok()) {
            config.server.port = port;
        }
        if let Some(dir) = &self.data_dir {
            config.data.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- config path ----

    #[test]
    fn test_config_path_flag_wins() {
        let args = CliArgs {
            config: Some(PathBuf::from("/etc/lookout.toml")),
            ..Default::default()
        };
        assert_eq!(
            args.config_path_from(Some("/tmp/other.toml".into())),
            PathBuf::from("/etc/lookout.toml")
        );
    }

    #[test]
    fn test_config_path_env_then_default() {
        let args = CliArgs::default();
        assert_eq!(
            args.config_path_from(Some("/tmp/other.toml".into())),
            PathBuf::from("/tmp/other.toml")
        );
        assert_eq!(args.config_path_from(None), PathBuf::from("lookout.toml"));
        assert_eq!(
            args.config_path_from(Some("  ".into())),
            PathBuf::from("lookout.toml")
        );
    }

    // ---- overrides ----

    #[test]
    fn test_port_priority() {
        let mut config = LookoutConfig::default();
        config.server.port = 9000;

        CliArgs::default().apply_with_env(&mut config, None);
        assert_eq!(config.server.port, 9000);

        CliArgs::default().apply_with_env(&mut config, Some("9100".into()));
        assert_eq!(config.server.port, 9100);

        let args = CliArgs {
            port: Some(9200),
            ..Default::default()
        };
        args.apply_with_env(&mut config, Some("9100".into()));
        assert_eq!(config.server.port, 9200);
    }

    #[test]
    fn test_invalid_port_env_ignored() {
        let mut config = LookoutConfig::default();
        CliArgs::default().apply_with_env(&mut config, Some("not-a-port".into()));
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_data_dir_and_log_level() {
        let mut config = LookoutConfig::default();
        let args = CliArgs {
            data_dir: Some(PathBuf::from("/srv/feeds")),
            log_level: Some("debug".into()),
            ..Default::default()
        };
        args.apply_with_env(&mut config, None);
        assert_eq!(config.data.data_dir, "/srv/feeds");
        assert_eq!(config.general.log_level, "debug");
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from(["lookout", "-p", "8080", "--data-dir", "Data"]);
        assert_eq!(args.port, Some(8080));
        assert_eq!(args.data_dir, Some(PathBuf::from("Data")));
        assert!(args.config.is_none());
    }
}
