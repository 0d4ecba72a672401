use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use slp_query::{DnsFailurePolicy, QueryParams};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub slp: SlpConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub advertise: Option<AdvertiseConfig>,
    #[serde(default, rename = "watch")]
    pub watches: Vec<WatchConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlpConfig {
    /// Path to the slptool binary
    #[serde(default = "default_program")]
    pub program: PathBuf,
    #[serde(default)]
    pub dns_failure_policy: DnsFailurePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_prune_after")]
    pub prune_after_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvertiseConfig {
    pub interface: String,
    pub address: String,
    /// Instance name, defaults to "slp-query-<hostname>"
    #[serde(default)]
    pub instance: Option<String>,
}

/// A query re-run every poll interval, its results kept in the store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatchConfig {
    pub name: String,
    pub service: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub criteria: BTreeMap<String, String>,
}

impl WatchConfig {
    pub fn params(&self) -> QueryParams {
        QueryParams {
            scope: self.scope.clone(),
            protocol: self.protocol.clone(),
            criteria: self.criteria.clone(),
        }
    }
}

fn default_program() -> PathBuf {
    PathBuf::from("slptool")
}

fn default_listen() -> String {
    "[::]:8427".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/slp-query/watches.db")
}

fn default_poll_interval() -> u64 {
    60
}

fn default_prune_after() -> u64 {
    3600
}

impl Default for SlpConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            dns_failure_policy: DnsFailurePolicy::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            poll_interval_secs: default_poll_interval(),
            prune_after_secs: default_prune_after(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.store.poll_interval_secs == 0 {
            bail!("store.poll_interval_secs must be greater than zero");
        }
        crate::store::db::stale_cutoff(self.store.prune_after_secs)
            .context("Invalid store.prune_after_secs")?;

        let mut names = HashSet::new();
        for watch in &self.watches {
            if watch.name.is_empty() || watch.service.is_empty() {
                bail!("Every watch needs a name and a service");
            }
            if !names.insert(watch.name.as_str()) {
                bail!("Duplicate watch name: {}", watch.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.slp.program, PathBuf::from("slptool"));
        assert_eq!(config.slp.dns_failure_policy, DnsFailurePolicy::Abort);
        assert_eq!(config.api.listen, "[::]:8427");
        assert_eq!(config.store.poll_interval_secs, 60);
        assert!(config.advertise.is_none());
        assert!(config.watches.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            [slp]
            program = "/usr/bin/slptool"
            dns_failure_policy = "skip"

            [api]
            listen = "127.0.0.1:9000"

            [store]
            db_path = "/tmp/watches.db"
            poll_interval_secs = 30

            [advertise]
            interface = "eth0"
            address = "fd00::1"

            [[watch]]
            name = "main-ldap"
            service = "ldap"
            criteria = { description = "main" }

            [[watch]]
            name = "lab-printers"
            service = "printer"
            scope = "lab"
            protocol = "lpr"
            "#,
        )
        .unwrap();

        assert_eq!(config.slp.dns_failure_policy, DnsFailurePolicy::Skip);
        assert_eq!(config.store.prune_after_secs, 3600);
        assert_eq!(config.advertise.as_ref().unwrap().interface, "eth0");
        assert_eq!(config.watches.len(), 2);

        let params = config.watches[0].params();
        assert_eq!(params.scope, "");
        assert!(params.protocol.is_none());
        assert_eq!(params.criteria.get("description").map(String::as_str), Some("main"));

        let params = config.watches[1].params();
        assert_eq!(params.scope, "lab");
        assert_eq!(params.protocol.as_deref(), Some("lpr"));
    }

    #[test]
    fn test_duplicate_watch_names_rejected() {
        let result = Config::parse(
            r#"
            [[watch]]
            name = "ldap"
            service = "ldap"

            [[watch]]
            name = "ldap"
            service = "ldap"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        assert!(Config::parse("[store]\npoll_interval_secs = 0\n").is_err());
    }

    #[test]
    fn test_oversized_prune_window_rejected() {
        assert!(Config::parse("[store]\nprune_after_secs = 9223372036854775807\n").is_err());
        assert!(Config::parse("[store]\nprune_after_secs = 31536000\n").is_ok());
    }
}
