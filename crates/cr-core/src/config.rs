use std::io;
use std::path::{Path, PathBuf};

use cr_engine::{DelayPolicy, ParserOptions, TextGranularity};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub replay: ReplayConfig,
    pub parser: ParserConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplayConfig {
    /// Constant pause before every event. When unset, tool outputs wait
    /// `tool_delay_ms` and everything else a random `jitter_*` pause.
    pub chunk_delay_ms: Option<u64>,
    pub tool_delay_ms: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub text_granularity: TextGranularity,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            chunk_delay_ms: None,
            tool_delay_ms: 1000,
            jitter_min_ms: 20,
            jitter_max_ms: 60,
            text_granularity: TextGranularity::Whole,
        }
    }
}

impl ReplayConfig {
    pub fn delay_policy(&self) -> DelayPolicy {
        match self.chunk_delay_ms {
            Some(ms) => DelayPolicy::fixed(ms),
            None => DelayPolicy::simulated_latency(
                self.tool_delay_ms,
                self.jitter_min_ms,
                self.jitter_max_ms,
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParserConfig {
    /// Fence/callout keyword marking an embedded tool call.
    pub keyword: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            keyword: cr_engine::markdown::DEFAULT_TOOL_NAME.to_string(),
        }
    }
}

impl ParserConfig {
    pub fn options(&self) -> ParserOptions {
        ParserOptions::with_keyword(self.keyword.clone())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("chatreplay").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cr_protocol::UiChunk;
    use serde_json::Value;
    use std::time::Duration;

    fn delta() -> UiChunk {
        UiChunk::TextDelta {
            id: "text-1".to_string(),
            delta: "x".to_string(),
        }
    }

    #[test]
    fn default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.replay.chunk_delay_ms, None);
        assert_eq!(cfg.replay.tool_delay_ms, 1000);
        assert_eq!(cfg.replay.text_granularity, TextGranularity::Whole);
        assert_eq!(cfg.parser.keyword, "tool");
        assert_eq!(cfg.logging.level, "warn");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn parse_empty_toml() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn parse_replay_section() {
        let toml_str = r#"
[replay]
chunk_delay_ms = 15
text_granularity = "words"
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.replay.chunk_delay_ms, Some(15));
        assert_eq!(cfg.replay.text_granularity, TextGranularity::Words);
        assert_eq!(cfg.replay.jitter_max_ms, 60);
        assert_eq!(
            cfg.replay.delay_policy().resolve(&delta()),
            Some(Duration::from_millis(15))
        );
    }

    #[test]
    fn simulated_latency_by_default() {
        let policy = ReplayConfig::default().delay_policy();
        let output = UiChunk::ToolOutputAvailable {
            tool_call_id: "c".to_string(),
            output: Value::Null,
        };
        assert_eq!(policy.resolve(&output), Some(Duration::from_secs(1)));
        let pause = policy.resolve(&delta()).unwrap();
        assert!(pause >= Duration::from_millis(20) && pause <= Duration::from_millis(60));
    }

    #[test]
    fn parse_parser_and_logging() {
        let toml_str = r#"
[parser]
keyword = "call"

[logging]
level = "debug"
json = true
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.parser.options(), ParserOptions::with_keyword("call"));
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[replay]\ntool_delay_ms = 250\n").unwrap();
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.replay.tool_delay_ms, 250);
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[replay\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn config_path_under_chatreplay() {
        assert!(config_path().ends_with("chatreplay/config.toml"));
    }
}
