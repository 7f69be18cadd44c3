use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Server settings read from `FARM_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `None` keeps the store in memory for the life of the process.
    pub db_path: Option<PathBuf>,
    pub seed_demo: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            db_path: None,
            seed_demo: true,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        // Empty values count as unset
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = var("FARM_HOST").unwrap_or(defaults.host);
        let port = match var("FARM_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("FARM_PORT must be a port number, got '{}'", raw))?,
            None => defaults.port,
        };
        let db_path = var("FARM_DB_PATH").map(PathBuf::from);
        let seed_demo = match var("FARM_SEED_DEMO") {
            Some(raw) => parse_flag(&raw).with_context(|| format!("invalid FARM_SEED_DEMO '{}'", raw))?,
            None => defaults.seed_demo,
        };

        Ok(Self {
            host,
            port,
            db_path,
            seed_demo,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .with_context(|| format!("invalid listen address '{}'", addr))
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => bail!("expected true/false"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("FARM_HOST", "127.0.0.1"),
            ("FARM_PORT", "8080"),
            ("FARM_DB_PATH", "/var/lib/farm/farm.db"),
            ("FARM_SEED_DEMO", "no"),
        ])
        .unwrap();

        assert_eq!(config.addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.db_path, Some(PathBuf::from("/var/lib/farm/farm.db")));
        assert!(!config.seed_demo);
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config(&[("FARM_PORT", " "), ("FARM_DB_PATH", "")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, None);
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("FARM_PORT", "eighty")]).is_err());
        assert!(config(&[("FARM_PORT", "70000")]).is_err());
        assert!(config(&[("FARM_SEED_DEMO", "maybe")]).is_err());
        assert!(config(&[("FARM_HOST", "not a host")]).unwrap().addr().is_err());
    }
}
