use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Monitoring interval used when a start request carries none.
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: i64,

    /// Wall-clock cap on one speed test run, ping and download together.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default = "default_speed_test_retries")]
    pub speed_test_retries: u32,

    /// Overrides the download URL catalog and user preferences entirely.
    #[serde(default)]
    pub speed_test_url: Option<String>,

    /// Target ids to start monitoring at boot, at the default interval.
    #[serde(default)]
    pub always_monitor: Vec<String>,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    listen_address: Option<String>,
    default_interval_ms: Option<i64>,
    default_timeout_ms: Option<u64>,
    speed_test_retries: Option<u32>,
    speed_test_url: Option<String>,
    always_monitor: Option<Vec<String>>,
    log_dir: Option<String>,
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_interval_ms() -> i64 {
    30_000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_speed_test_retries() -> u32 {
    2
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        // 1. Load from file (optional)
        let file_config: PartialServerConfig = if let Some(path_str) = config_path {
            let path = Path::new(path_str);
            if path.exists() {
                let contents = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                toml::from_str(&contents).map_err(|e| {
                    format!("Failed to parse TOML from config file at {path:?}: {e}")
                })?
            } else {
                PartialServerConfig::default()
            }
        } else {
            PartialServerConfig::default()
        };

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        Self::merge(file_config, env_config)
    }

    // 3. Merge: environment overrides file, defaults fill the rest.
    fn merge(file: PartialServerConfig, env: PartialServerConfig) -> Result<Self, String> {
        let config = ServerConfig {
            listen_address: env
                .listen_address
                .or(file.listen_address)
                .unwrap_or_else(default_listen_address),
            default_interval_ms: env
                .default_interval_ms
                .or(file.default_interval_ms)
                .unwrap_or_else(default_interval_ms),
            default_timeout_ms: env
                .default_timeout_ms
                .or(file.default_timeout_ms)
                .unwrap_or_else(default_timeout_ms),
            speed_test_retries: env
                .speed_test_retries
                .or(file.speed_test_retries)
                .unwrap_or_else(default_speed_test_retries),
            speed_test_url: env.speed_test_url.or(file.speed_test_url),
            always_monitor: env
                .always_monitor
                .or(file.always_monitor)
                .unwrap_or_default(),
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
        };

        if config.default_interval_ms <= 0 {
            return Err(format!(
                "DEFAULT_INTERVAL_MS must be positive, got {}",
                config.default_interval_ms
            ));
        }
        if config.default_timeout_ms == 0 {
            return Err("DEFAULT_TIMEOUT_MS must be positive".to_string());
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config =
            ServerConfig::merge(PartialServerConfig::default(), PartialServerConfig::default())
                .unwrap();

        assert_eq!(config.listen_address, "0.0.0.0:8080");
        assert_eq!(config.default_interval_ms, 30_000);
        assert_eq!(config.default_timeout_ms, 10_000);
        assert_eq!(config.speed_test_retries, 2);
        assert!(config.speed_test_url.is_none());
        assert!(config.always_monitor.is_empty());
        assert_eq!(config.log_dir, "logs");
    }

    #[test]
    fn environment_overrides_file_values() {
        let file: PartialServerConfig = toml::from_str(
            r#"
            listen_address = "127.0.0.1:9000"
            default_interval_ms = 60000
            speed_test_url = "https://speed.example.net/file.bin"
            "#,
        )
        .unwrap();
        let env = PartialServerConfig {
            default_interval_ms: Some(5_000),
            ..Default::default()
        };

        let config = ServerConfig::merge(file, env).unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:9000");
        assert_eq!(config.default_interval_ms, 5_000);
        assert_eq!(
            config.speed_test_url.as_deref(),
            Some("https://speed.example.net/file.bin")
        );
    }

    #[test]
    fn non_positive_interval_is_rejected() {
        let file = PartialServerConfig {
            default_interval_ms: Some(0),
            ..Default::default()
        };
        assert!(ServerConfig::merge(file, PartialServerConfig::default()).is_err());
    }
}
