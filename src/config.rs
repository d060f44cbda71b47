//! Node configuration.
//!
//! Sources, lowest precedence first: built-in defaults, a TOML file, then
//! `STRATA_*` environment variables. [`StrataConfig::validate`] runs after all
//! three are merged.
//!
//! ```toml
//! [registry]
//! root_subspace = "ff2f"
//!
//! [follower]
//! poll_interval_ms = 1000
//! compaction_policy = "hold_for_active_followers"
//!
//! [node]
//! listen_addr = "127.0.0.1:4500"
//! ```

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use snafu::Snafu;
use strata_config_follower::CompactionPolicy;
use strata_config_follower::ConfigClassSet;
use strata_config_follower::ConsumerConfig;
use strata_config_follower::ServiceConfig;
use strata_constants::RESERVED_KEY_PREFIX;
use strata_constants::follower::MAX_CHANGES_PER_REPLY;
use strata_constants::follower::MAX_CONFIG_CLASSES;
use strata_layer::Subspace;
use strata_tenant::TenantMetadataSpecification;

/// Configuration errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("failed to read config file {}: {source}", path.display()))]
    ReadFile { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to parse config file: {source}"))]
    ParseToml { source: toml::de::Error },

    #[snafu(display("invalid configuration for {key}: '{value}' ({reason})"))]
    InvalidValue { key: String, value: String, reason: String },
}

mod defaults {
    use strata_constants::follower::DEFAULT_CHANGES_PER_REPLY;
    use strata_constants::follower::DEFAULT_COMPACTION_INTERVAL_MS;
    use strata_constants::follower::DEFAULT_FOLLOWER_LEASE_MS;
    use strata_constants::follower::DEFAULT_POLL_INTERVAL_MS;

    pub fn root_subspace() -> String {
        "ff2f".to_string()
    }
    pub fn poll_interval_ms() -> u64 {
        DEFAULT_POLL_INTERVAL_MS
    }
    pub fn compaction_interval_ms() -> u64 {
        DEFAULT_COMPACTION_INTERVAL_MS
    }
    pub fn max_changes_per_reply() -> u32 {
        DEFAULT_CHANGES_PER_REPLY
    }
    pub fn follower_lease_ms() -> u64 {
        DEFAULT_FOLLOWER_LEASE_MS
    }
    pub fn listen_addr() -> String {
        "127.0.0.1:4500".to_string()
    }
}

/// Tenant registry placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Hex-encoded root subspace of the registry containers.
    #[serde(default = "defaults::root_subspace")]
    pub root_subspace: String,
    /// Hex-encoded subspace tenant prefixes are allocated under.
    #[serde(default)]
    pub tenant_subspace: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root_subspace: defaults::root_subspace(),
            tenant_subspace: String::new(),
        }
    }
}

/// Follower protocol tuning, for both the responder and the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerConfig {
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "defaults::compaction_interval_ms")]
    pub compaction_interval_ms: u64,
    #[serde(default = "defaults::max_changes_per_reply")]
    pub max_changes_per_reply: u32,
    #[serde(default = "defaults::follower_lease_ms")]
    pub follower_lease_ms: u64,
    #[serde(default)]
    pub compaction_policy: CompactionPolicy,
    /// Classes the local consumer follows. Empty follows everything.
    #[serde(default)]
    pub config_classes: Vec<String>,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::poll_interval_ms(),
            compaction_interval_ms: defaults::compaction_interval_ms(),
            max_changes_per_reply: defaults::max_changes_per_reply(),
            follower_lease_ms: defaults::follower_lease_ms(),
            compaction_policy: CompactionPolicy::default(),
            config_classes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the follower endpoints are served at.
    #[serde(default = "defaults::listen_addr")]
    pub listen_addr: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: defaults::listen_addr(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub follower: FollowerConfig,
    #[serde(default)]
    pub node: NodeConfig,
}

fn invalid(key: &str, value: impl ToString, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| invalid(key, value, e.to_string()))
}

impl StrataConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).context(ParseTomlSnafu)
    }

    /// Apply `STRATA_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) -> Result<(), ConfigError> {
        if let Some(v) = lookup("STRATA_REGISTRY_ROOT_SUBSPACE") {
            self.registry.root_subspace = v;
        }
        if let Some(v) = lookup("STRATA_REGISTRY_TENANT_SUBSPACE") {
            self.registry.tenant_subspace = v;
        }
        if let Some(v) = lookup("STRATA_FOLLOWER_POLL_INTERVAL_MS") {
            self.follower.poll_interval_ms = parse_env("STRATA_FOLLOWER_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("STRATA_FOLLOWER_COMPACTION_INTERVAL_MS") {
            self.follower.compaction_interval_ms = parse_env("STRATA_FOLLOWER_COMPACTION_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("STRATA_FOLLOWER_MAX_CHANGES_PER_REPLY") {
            self.follower.max_changes_per_reply = parse_env("STRATA_FOLLOWER_MAX_CHANGES_PER_REPLY", &v)?;
        }
        if let Some(v) = lookup("STRATA_FOLLOWER_LEASE_MS") {
            self.follower.follower_lease_ms = parse_env("STRATA_FOLLOWER_LEASE_MS", &v)?;
        }
        if let Some(v) = lookup("STRATA_FOLLOWER_COMPACTION_POLICY") {
            self.follower.compaction_policy = match v.as_str() {
                "hold_for_active_followers" => CompactionPolicy::HoldForActiveFollowers,
                "force_resnapshot" => CompactionPolicy::ForceResnapshot,
                _ => {
                    return Err(invalid(
                        "STRATA_FOLLOWER_COMPACTION_POLICY",
                        &v,
                        "expected hold_for_active_followers or force_resnapshot",
                    ));
                }
            };
        }
        if let Some(v) = lookup("STRATA_FOLLOWER_CONFIG_CLASSES") {
            self.follower.config_classes =
                v.split(',').map(str::trim).filter(|c| !c.is_empty()).map(str::to_string).collect();
        }
        if let Some(v) = lookup("STRATA_NODE_LISTEN_ADDR") {
            self.node.listen_addr = v;
        }
        Ok(())
    }

    /// Reject values the follower and registry cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let root = self.root_subspace()?;
        if root.is_empty() {
            return Err(invalid("registry.root_subspace", "", "must not be empty"));
        }
        if root.starts_with(RESERVED_KEY_PREFIX) {
            return Err(invalid("registry.root_subspace", &self.registry.root_subspace, "reserved keyspace"));
        }
        if self.tenant_subspace()?.starts_with(RESERVED_KEY_PREFIX) {
            return Err(invalid("registry.tenant_subspace", &self.registry.tenant_subspace, "reserved keyspace"));
        }

        let f = &self.follower;
        if f.poll_interval_ms == 0 {
            return Err(invalid("follower.poll_interval_ms", 0, "must be positive"));
        }
        if f.compaction_interval_ms == 0 {
            return Err(invalid("follower.compaction_interval_ms", 0, "must be positive"));
        }
        if f.max_changes_per_reply == 0 || f.max_changes_per_reply > MAX_CHANGES_PER_REPLY {
            return Err(invalid(
                "follower.max_changes_per_reply",
                f.max_changes_per_reply,
                format!("must be in 1..={MAX_CHANGES_PER_REPLY}"),
            ));
        }
        if f.config_classes.len() > MAX_CONFIG_CLASSES as usize {
            return Err(invalid(
                "follower.config_classes",
                f.config_classes.len(),
                format!("at most {MAX_CONFIG_CLASSES} classes"),
            ));
        }
        if self.node.listen_addr.trim().is_empty() {
            return Err(invalid("node.listen_addr", "", "must not be empty"));
        }
        Ok(())
    }

    pub fn root_subspace(&self) -> Result<Vec<u8>, ConfigError> {
        hex::decode(&self.registry.root_subspace)
            .map_err(|e| invalid("registry.root_subspace", &self.registry.root_subspace, e.to_string()))
    }

    pub fn tenant_subspace(&self) -> Result<Vec<u8>, ConfigError> {
        hex::decode(&self.registry.tenant_subspace)
            .map_err(|e| invalid("registry.tenant_subspace", &self.registry.tenant_subspace, e.to_string()))
    }

    pub fn registry_layout(&self) -> Result<TenantMetadataSpecification, ConfigError> {
        Ok(TenantMetadataSpecification::new(Subspace::from_bytes(self.root_subspace()?)))
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            max_changes_per_reply: self.follower.max_changes_per_reply,
            follower_lease: Duration::from_millis(self.follower.follower_lease_ms),
            compaction_policy: self.follower.compaction_policy,
            ..ServiceConfig::default()
        }
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        let config_classes = if self.follower.config_classes.is_empty() {
            None
        } else {
            Some(self.follower.config_classes.iter().map(String::as_str).collect::<ConfigClassSet>())
        };
        ConsumerConfig {
            poll_interval: Duration::from_millis(self.follower.poll_interval_ms),
            compaction_interval: Duration::from_millis(self.follower.compaction_interval_ms),
            config_classes,
        }
    }
}
