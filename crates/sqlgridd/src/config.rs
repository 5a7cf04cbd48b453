//! sqlgridd.toml configuration parser.
//!
//! Every field has a default, so a missing file or empty table still yields
//! a runnable configuration. Durations are human strings ("30s", "500ms",
//! "1m") parsed at use time.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Ceiling on simultaneously open database connections.
    pub max_connections: usize,
    /// Per-request timeout, e.g. "30s".
    pub request_timeout: String,
    /// Whether to mount the /mcp endpoint.
    pub enable_mcp: bool,
    /// Whether to add the permissive CORS layer.
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            request_timeout: "30s".to_string(),
            enable_mcp: true,
            enable_cors: true,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// The request timeout as a duration, defaulting to 30s on a value the
    /// parser does not understand.
    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.server.request_timeout).unwrap_or(Duration::from_secs(30))
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_with_no_file_content() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.max_connections, 100);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.server.enable_mcp);
        assert!(config.server.enable_cors);
    }

    #[test]
    fn partial_server_table_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
[server]
max_connections = 8
enable_cors = false
"#,
        )
        .unwrap();
        assert_eq!(config.server.max_connections, 8);
        assert!(!config.server.enable_cors);
        assert!(config.server.enable_mcp);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn request_timeout_parses_duration_strings() {
        let mut config = Config::default();
        config.server.request_timeout = "500ms".to_string();
        assert_eq!(config.request_timeout(), Duration::from_millis(500));

        config.server.request_timeout = "2m".to_string();
        assert_eq!(config.request_timeout(), Duration::from_secs(120));

        config.server.request_timeout = "10".to_string();
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn unparseable_timeout_falls_back_to_default() {
        let mut config = Config::default();
        config.server.request_timeout = "soon".to_string();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn from_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlgridd.toml");
        std::fs::write(&path, "[server]\nmax_connections = 3\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.max_connections, 3);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::from_file(Path::new("/nonexistent/sqlgridd.toml")).is_err());
    }
}
