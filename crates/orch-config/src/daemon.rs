use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::logging::LoggingConfig;
use crate::runtime::RuntimeConfig;
use crate::server::ServerConfig;
use crate::validate;

// ---------------------------------------------------------------------------
// OrchdConfig
// ---------------------------------------------------------------------------

/// Top-level `orchd.toml` configuration, validated at parse time.
#[derive(Debug, Deserialize)]
pub struct OrchdConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl OrchdConfig {
    /// Read and parse an `orchd.toml` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.as_ref().display()))?;
        content.parse()
    }
}

impl FromStr for OrchdConfig {
    type Err = anyhow::Error;

    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let config: OrchdConfig = toml::from_str(toml_str)?;
        validate::validate(&config)?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const FULL_TOML: &str = r#"
[server]
listen = "tcp://127.0.0.1:9600"

[runtime]
tick_interval = "1s"
channel_capacity = 512
output = "tables.jsonl"
sampling_service = "hsflowd"

[logging]
level = "debug"
format = "plain"
"#;

    #[test]
    fn load_full_toml() {
        let cfg: OrchdConfig = FULL_TOML.parse().unwrap();
        assert_eq!(cfg.server.listen, "tcp://127.0.0.1:9600");
        assert_eq!(
            cfg.runtime.tick_interval.as_duration(),
            Duration::from_secs(1)
        );
        assert_eq!(cfg.runtime.channel_capacity, 512);
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg: OrchdConfig = "[server]\nlisten = \"tcp://0.0.0.0:9600\"\n".parse().unwrap();
        assert_eq!(
            cfg.runtime.tick_interval.as_duration(),
            Duration::from_secs(1)
        );
        assert_eq!(cfg.runtime.sampling_service, "hsflowd");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn reject_bad_listen() {
        let toml = FULL_TOML.replace("tcp://127.0.0.1:9600", "udp://127.0.0.1:9600");
        assert!(toml.parse::<OrchdConfig>().is_err());
        let toml = FULL_TOML.replace("tcp://127.0.0.1:9600", "tcp://nowhere");
        assert!(toml.parse::<OrchdConfig>().is_err());
    }

    #[test]
    fn reject_zero_tick() {
        let toml = FULL_TOML.replace("tick_interval = \"1s\"", "tick_interval = \"0s\"");
        assert!(toml.parse::<OrchdConfig>().is_err());
    }

    #[test]
    fn missing_server_fails() {
        assert!("[runtime]\nchannel_capacity = 4\n".parse::<OrchdConfig>().is_err());
    }
}
