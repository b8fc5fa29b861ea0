use crate::core::{BuilderConfig, ValidatorConfig};
use crate::error::{NodeError, Result};
use crate::network::SyncConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_LISTEN_ADDR: &str = "PEERLEDGER_LISTEN_ADDR";
const ENV_DATA_DIR: &str = "PEERLEDGER_DATA_DIR";
const ENV_PEERS: &str = "PEERLEDGER_PEERS";

/// Node settings, layered: built-in defaults, then an optional TOML
/// file, then environment overrides. Handed to constructors explicitly;
/// nothing reads configuration ambiently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listen_addr: String,
    pub data_dir: PathBuf,
    pub difficulty: u32,
    pub genesis_difficulty: u32,
    pub max_tx_per_block: usize,
    pub max_block_size: u32,
    pub expected_genesis_index: u64,
    pub build_interval_secs: u64,
    pub build_wait_secs: u64,
    pub sync_interval_secs: u64,
    pub read_timeout_secs: u64,
    pub session_ttl_secs: u64,
    pub node_type: String,
    /// Static peer endpoints, `ip:port`
    pub peers: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7331".to_string(),
            data_dir: PathBuf::from("data"),
            difficulty: 2,
            genesis_difficulty: 1,
            max_tx_per_block: 1,
            max_block_size: 1_000_000,
            expected_genesis_index: 0,
            build_interval_secs: 60,
            build_wait_secs: 60,
            sync_interval_secs: 30,
            read_timeout_secs: 10,
            session_ttl_secs: 3600,
            node_type: "full".to_string(),
            peers: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings: defaults, overlaid by `path` (when given and
    /// present), overlaid by environment variables.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let mut settings = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| NodeError::Config(format!("cannot read {path:?}: {e}")))?;
                toml::from_str(&raw)
                    .map_err(|e| NodeError::Config(format!("cannot parse {path:?}: {e}")))?
            }
            Some(path) => {
                return Err(NodeError::Config(format!(
                    "configuration file {path:?} not found"
                )))
            }
            None => Settings::default(),
        };

        if let Ok(addr) = env::var(ENV_LISTEN_ADDR) {
            settings.listen_addr = addr;
        }
        if let Ok(dir) = env::var(ENV_DATA_DIR) {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Ok(peers) = env::var(ENV_PEERS) {
            settings.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(settings)
    }

    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            max_tx_per_block: self.max_tx_per_block,
            build_wait: Duration::from_secs(self.build_wait_secs),
            difficulty: self.difficulty,
            genesis_difficulty: self.genesis_difficulty,
        }
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            max_block_size: self.max_block_size,
            expected_genesis_index: self.expected_genesis_index,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            poll_interval: Duration::from_secs(self.sync_interval_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            connect_timeout: Duration::from_secs(5),
            session_ttl: Some(Duration::from_secs(self.session_ttl_secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_tx_per_block, 1);
        assert_eq!(settings.build_wait_secs, 60);
        assert_eq!(settings.sync_interval_secs, 30);
        assert!(settings.peers.is_empty());
    }

    #[test]
    fn test_load_from_toml_overlays_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "listen_addr = \"0.0.0.0:9000\"\ndifficulty = 3\npeers = [\"10.0.0.1:7331\"]"
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.listen_addr, "0.0.0.0:9000");
        assert_eq!(settings.difficulty, 3);
        assert_eq!(settings.peers, vec!["10.0.0.1:7331".to_string()]);
        // Untouched fields keep their defaults
        assert_eq!(settings.sync_interval_secs, 30);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Settings::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(NodeError::Config(_))));
    }

    #[test]
    fn test_derived_configs() {
        let settings = Settings::default();
        let builder = settings.builder_config();
        assert_eq!(builder.max_tx_per_block, 1);
        assert_eq!(builder.build_wait, Duration::from_secs(60));

        let sync = settings.sync_config();
        assert_eq!(sync.poll_interval, Duration::from_secs(30));
    }
}
