//! Configuration System
//!
//! Loads configuration from YAML files with a cascading priority system:
//! 1. `./meshcore.yaml` (current directory - highest priority)
//! 2. `~/.meshcore.yaml` (home directory)
//! 3. `~/.config/meshcore/meshcore.yaml` (user config directory)
//! 4. `/etc/meshcore/meshcore.yaml` (system - lowest priority)
//!
//! Values from higher priority files override those from lower priority files.
//!
//! # YAML Structure
//!
//! ```yaml
//! node:
//!   identity:
//!     nsec: "nsec1..."
//!   session:
//!     idle_timeout_secs: 180
//!   discovery:
//!     families: [inet, inet6]
//!     peers: ["192.0.2.1:4000"]
//! ```

mod node;

use crate::{Identity, IdentityError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use node::{BuffersConfig, DiscoveryConfig, NodeConfig, SessionConfig};

/// Default config filename.
const CONFIG_FILENAME: &str = "meshcore.yaml";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
}

/// Identity configuration (`node.identity.*`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Secret key in nsec (bech32) or hex format (`node.identity.nsec`).
    /// If not specified, a new keypair will be generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsec: Option<String>,
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Node configuration (`node.*`).
    #[serde(default)]
    pub node: NodeConfig,
}

impl Config {
    /// Create a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the standard search paths.
    ///
    /// Returns a tuple of (config, paths_loaded) where paths_loaded contains
    /// the paths that were successfully loaded.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let search_paths = Self::search_paths();
        Self::load_from_paths(&search_paths)
    }

    /// Load configuration from specific paths.
    ///
    /// Paths are processed in order, with later paths overriding earlier ones.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = Config::default();
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                let file_config = Self::load_file(path)?;
                config.merge(file_config);
                loaded_paths.push(path.clone());
            }
        }

        Ok((config, loaded_paths))
    }

    /// Load configuration from a single file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the standard search paths in priority order (lowest to highest).
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from("/etc/meshcore").join(CONFIG_FILENAME));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("meshcore").join(CONFIG_FILENAME));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".meshcore.yaml"));
        }

        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));

        paths
    }

    /// Merge another configuration into this one.
    ///
    /// Sections of `other` that differ from their defaults replace the
    /// corresponding sections of `self`; address lists replace when non-empty.
    pub fn merge(&mut self, other: Config) {
        let node = other.node;
        if node.identity.nsec.is_some() {
            self.node.identity.nsec = node.identity.nsec;
        }
        if node.session != SessionConfig::default() {
            self.node.session = node.session;
        }
        if node.buffers != BuffersConfig::default() {
            self.node.buffers = node.buffers;
        }
        if node.tick_interval_ms != NodeConfig::default().tick_interval_ms {
            self.node.tick_interval_ms = node.tick_interval_ms;
        }

        let defaults = DiscoveryConfig::default();
        let discovery = node.discovery;
        let ours = &mut self.node.discovery;
        if discovery.enabled != defaults.enabled {
            ours.enabled = discovery.enabled;
        }
        if discovery.query_timeout_ms != defaults.query_timeout_ms {
            ours.query_timeout_ms = discovery.query_timeout_ms;
        }
        if discovery.round_timeout_secs != defaults.round_timeout_secs {
            ours.round_timeout_secs = discovery.round_timeout_secs;
        }
        if discovery.probes_per_tick != defaults.probes_per_tick {
            ours.probes_per_tick = discovery.probes_per_tick;
        }
        if discovery.families != defaults.families {
            ours.families = discovery.families;
        }
        if !discovery.supernodes.is_empty() {
            ours.supernodes = discovery.supernodes;
        }
        if !discovery.peers.is_empty() {
            ours.peers = discovery.peers;
        }
    }

    /// Create an Identity from this configuration.
    ///
    /// If an nsec is configured, uses that to create the identity.
    /// Otherwise, generates a new random identity.
    pub fn create_identity(&self) -> Result<Identity, ConfigError> {
        match &self.node.identity.nsec {
            Some(nsec) => Ok(Identity::from_secret_str(nsec)?),
            None => Ok(Identity::generate()),
        }
    }

    /// Check if an identity is configured (vs. will be generated).
    pub fn has_identity(&self) -> bool {
        self.node.identity.nsec.is_some()
    }

    /// Serialize this configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::AddressFamily;
    use std::fs;
    use std::net::SocketAddr;
    use tempfile::TempDir;

    const TEST_SECRET_HEX: &str =
        "0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20";

    #[test]
    fn test_empty_config() {
        let config = Config::new();
        assert!(config.node.identity.nsec.is_none());
        assert!(!config.has_identity());
        assert_eq!(config.node.session.idle_timeout_secs, 180);
        assert_eq!(config.node.discovery.query_timeout_ms, 3000);
        assert_eq!(config.node.tick_interval_ms, 1000);
    }

    #[test]
    fn test_parse_yaml_empty() {
        let config: Config = serde_yaml::from_str("").unwrap();
        assert!(config.node.identity.nsec.is_none());
        assert_eq!(config.node.session, SessionConfig::default());
        assert_eq!(config.node.discovery, DiscoveryConfig::default());
    }

    #[test]
    fn test_parse_yaml_with_hex() {
        let yaml = format!(
            r#"
node:
  identity:
    nsec: "{TEST_SECRET_HEX}"
"#
        );
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.has_identity());

        let identity = config.create_identity().unwrap();
        assert!(identity.npub().starts_with("npub1"));
    }

    #[test]
    fn test_parse_sections() {
        let yaml = r#"
node:
  session:
    idle_timeout_secs: 30
    max_sessions: 8
  discovery:
    query_timeout_ms: 500
    probes_per_tick: 0
    families: [inet6]
    supernodes: ["[2001:db8::1]:4000"]
    peers: ["192.0.2.1:4000", "192.0.2.2:4000"]
  buffers:
    interface_channel: 16
  tick_interval_ms: 250
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let node = &config.node;

        assert_eq!(node.session.idle_timeout_secs, 30);
        assert_eq!(node.session.idle_timeout_ms(), 30_000);
        assert_eq!(node.session.max_sessions, 8);
        assert_eq!(node.session.hop_limit, crate::wire::DEFAULT_HOP_LIMIT);

        assert_eq!(node.discovery.query_timeout_ms, 500);
        assert_eq!(node.discovery.probes_per_tick, 0);
        assert!(node.discovery.allows(AddressFamily::Inet6));
        assert!(!node.discovery.allows(AddressFamily::Inet));
        assert_eq!(
            node.discovery.supernodes,
            vec!["[2001:db8::1]:4000".parse::<SocketAddr>().unwrap()]
        );
        assert_eq!(node.discovery.peers.len(), 2);

        assert_eq!(node.buffers.interface_channel, 16);
        assert_eq!(node.buffers.query_channel, 256);
        assert_eq!(node.tick_interval_ms, 250);
    }

    #[test]
    fn test_parse_rejects_unknown_family() {
        let yaml = r#"
node:
  discovery:
    families: [appletalk]
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_merge_configs() {
        let mut base = Config::new();
        base.node.identity.nsec = Some("base_nsec".to_string());
        base.node.discovery.peers = vec!["192.0.2.1:4000".parse().unwrap()];

        let mut override_config = Config::new();
        override_config.node.identity.nsec = Some("override_nsec".to_string());
        override_config.node.session.idle_timeout_secs = 10;

        base.merge(override_config);
        assert_eq!(base.node.identity.nsec, Some("override_nsec".to_string()));
        assert_eq!(base.node.session.idle_timeout_secs, 10);
        // Lists left empty by the override keep the base values.
        assert_eq!(base.node.discovery.peers.len(), 1);
    }

    #[test]
    fn test_merge_preserves_base_when_override_empty() {
        let mut base = Config::new();
        base.node.identity.nsec = Some("base_nsec".to_string());
        base.node.discovery.query_timeout_ms = 100;

        base.merge(Config::new());
        assert_eq!(base.node.identity.nsec, Some("base_nsec".to_string()));
        assert_eq!(base.node.discovery.query_timeout_ms, 100);
    }

    #[test]
    fn test_create_identity_generates_new() {
        let config = Config::new();
        let identity = config.create_identity().unwrap();
        assert!(!identity.npub().is_empty());
    }

    #[test]
    fn test_create_identity_bad_secret() {
        let mut config = Config::new();
        config.node.identity.nsec = Some("not a key".to_string());
        assert!(matches!(
            config.create_identity(),
            Err(ConfigError::Identity(_))
        ));
    }

    #[test]
    fn test_load_from_paths_merges() {
        let temp_dir = TempDir::new().unwrap();
        let low_priority = temp_dir.path().join("low.yaml");
        let high_priority = temp_dir.path().join("high.yaml");

        fs::write(
            &low_priority,
            r#"
node:
  identity:
    nsec: "low_priority_nsec"
  discovery:
    peers: ["192.0.2.1:4000"]
"#,
        )
        .unwrap();

        fs::write(
            &high_priority,
            r#"
node:
  identity:
    nsec: "high_priority_nsec"
"#,
        )
        .unwrap();

        let paths = vec![low_priority, high_priority];
        let (config, loaded) = Config::load_from_paths(&paths).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(
            config.node.identity.nsec,
            Some("high_priority_nsec".to_string())
        );
        assert_eq!(config.node.discovery.peers.len(), 1);
    }

    #[test]
    fn test_load_skips_missing_files() {
        let temp_dir = TempDir::new().unwrap();
        let existing = temp_dir.path().join("exists.yaml");
        let missing = temp_dir.path().join("missing.yaml");

        fs::write(
            &existing,
            r#"
node:
  identity:
    nsec: "existing_nsec"
"#,
        )
        .unwrap();

        let paths = vec![missing, existing.clone()];
        let (config, loaded) = Config::load_from_paths(&paths).unwrap();

        assert_eq!(loaded, vec![existing]);
        assert_eq!(config.node.identity.nsec, Some("existing_nsec".to_string()));
    }

    #[test]
    fn test_load_file_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.yaml");
        fs::write(&path, "node: [unclosed").unwrap();

        assert!(matches!(
            Config::load_file(&path),
            Err(ConfigError::ParseYaml { .. })
        ));
    }

    #[test]
    fn test_search_paths_includes_expected() {
        let paths = Config::search_paths();

        assert!(paths.iter().any(|p| p.ends_with("meshcore.yaml")));
        assert!(paths
            .iter()
            .any(|p| p.starts_with("/etc/meshcore") && p.ends_with("meshcore.yaml")));
    }

    #[test]
    fn test_to_yaml_empty_nsec_omitted() {
        let config = Config::new();
        let yaml = config.to_yaml().unwrap();

        assert!(yaml.contains("node:"));
        assert!(!yaml.contains("nsec:"));
    }

    #[test]
    fn test_to_yaml_roundtrip() {
        let mut config = Config::new();
        config.node.identity.nsec = Some("test_nsec".to_string());
        config.node.discovery.families = vec![AddressFamily::Inet];

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("test_nsec"));
        assert!(yaml.contains("inet"));

        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.node.discovery, config.node.discovery);
    }
}
