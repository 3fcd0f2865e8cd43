use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_port() -> u16 {
    8143
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_timeout() -> u64 {
    120
}
fn default_level() -> String {
    "info".to_string()
}

/// Logging-related settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Tracing filter directive (defaults to `info`).
    #[serde(default = "default_level")]
    pub level: String,
    /// Log incoming chat request bodies at debug level.
    #[serde(default)]
    pub log_requests: bool,
    /// Log non-streaming chat response bodies at debug level.
    #[serde(default)]
    pub log_responses: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_requests: false,
            log_responses: false,
        }
    }
}

/// Top-level application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Listen port (defaults to 8143).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen address (defaults to `127.0.0.1`).
    #[serde(default = "default_host")]
    pub host: String,
    /// Request timeout in seconds (defaults to 120). Bounds time-to-headers;
    /// a streaming body in flight is not cut off.
    #[serde(default = "default_timeout")]
    pub request_timeout: u64,
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Provider id chats route to when the request names none.
    #[serde(default)]
    pub active_provider: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            request_timeout: default_timeout(),
            logging: LoggingSettings::default(),
            active_provider: None,
        }
    }
}

impl Settings {
    /// Defaults overlaid with `QWENGATE_*` environment variables
    /// (`QWENGATE_PORT`, `QWENGATE_LOGGING__LEVEL`, …; `__` nests).
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Serialized},
        };
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Env::prefixed("QWENGATE_").split("__"))
            .extract()
    }

    /// Overlays rows of the durable `settings` table. Database values win
    /// over environment and defaults; unparsable values are logged and kept
    /// at their previous layer.
    pub fn apply_db(&mut self, rows: &HashMap<String, String>) {
        for (key, value) in rows {
            match key.as_str() {
                "port" => match value.parse() {
                    Ok(p) => self.port = p,
                    Err(_) => tracing::warn!(value, "ignoring unparsable port setting"),
                },
                "host" => self.host = value.clone(),
                "request_timeout" => match value.parse() {
                    Ok(t) => self.request_timeout = t,
                    Err(_) => {
                        tracing::warn!(value, "ignoring unparsable request_timeout setting");
                    }
                },
                "logging.level" => self.logging.level = value.clone(),
                "logging.log_requests" => {
                    self.logging.log_requests = value == "true" || value == "1";
                }
                "logging.log_responses" => {
                    self.logging.log_responses = value == "true" || value == "1";
                }
                "active_provider" => {
                    self.active_provider = if value.is_empty() {
                        None
                    } else {
                        Some(value.clone())
                    };
                }
                _ => tracing::debug!(key, "unknown setting row"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.port, 8143);
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.request_timeout, 120);
        assert_eq!(s.logging.level, "info");
        assert!(!s.logging.log_requests);
        assert!(s.active_provider.is_none());
    }

    #[test]
    fn test_env_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("QWENGATE_PORT", "9100");
            jail.set_env("QWENGATE_LOGGING__LEVEL", "debug");
            let s = Settings::from_env().unwrap();
            assert_eq!(s.port, 9100);
            assert_eq!(s.logging.level, "debug");
            assert_eq!(s.host, "127.0.0.1");
            Ok(())
        });
    }

    #[test]
    fn test_db_overrides_everything() {
        let mut s = Settings::default();
        s.apply_db(&rows(&[
            ("port", "9200"),
            ("host", "0.0.0.0"),
            ("request_timeout", "45"),
            ("logging.level", "trace"),
            ("logging.log_requests", "true"),
            ("logging.log_responses", "1"),
            ("active_provider", "qwen-direct"),
        ]));
        assert_eq!(s.port, 9200);
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.request_timeout, 45);
        assert_eq!(s.logging.level, "trace");
        assert!(s.logging.log_requests);
        assert!(s.logging.log_responses);
        assert_eq!(s.active_provider.as_deref(), Some("qwen-direct"));
    }

    #[test]
    fn test_db_bad_values_keep_previous() {
        let mut s = Settings::default();
        s.apply_db(&rows(&[("port", "not-a-port"), ("request_timeout", "-4")]));
        assert_eq!(s.port, 8143);
        assert_eq!(s.request_timeout, 120);
    }

    #[test]
    fn test_db_empty_active_provider_clears() {
        let mut s = Settings::default();
        s.active_provider = Some("x".into());
        s.apply_db(&rows(&[("active_provider", "")]));
        assert!(s.active_provider.is_none());
    }

    #[test]
    fn test_unknown_rows_ignored() {
        let mut s = Settings::default();
        s.apply_db(&rows(&[("future_knob", "whatever")]));
        assert_eq!(s.port, 8143);
    }
}
