use std::fs;
use std::io;
use std::time::Duration;

use chordkv_core::consts::DEFAULT_CONNECTION_IDLE_TIMEOUT;
use chordkv_core::consts::DEFAULT_MIGRATION_PORT;
use chordkv_core::consts::DEFAULT_RARELY_ACCESSED;
use chordkv_core::consts::DEFAULT_RARELY_ACCESSED_CHECK_INTERVAL;
use chordkv_core::consts::DEFAULT_RECONCILIATION_PORT;
use chordkv_core::consts::DEFAULT_REQUEST_TIMEOUT;
use chordkv_core::consts::DEFAULT_REPLICATION_PORT;
use chordkv_core::consts::DEFAULT_RING_PORT;
use chordkv_core::consts::DEFAULT_STABILIZE_INTERVAL;
use chordkv_core::consts::DEFAULT_WAIT_SUCCESSOR_INTERVAL;
use chordkv_core::replica::PortLayout;
use chordkv_rpc::retry::Retry;
use chordkv_rpc::retry::DEFAULT_RETRY_ATTEMPTS;
use chordkv_rpc::retry::DEFAULT_RETRY_TIMEOUT;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::util::ensure_parent_dir;
use crate::util::expand_home;

pub const DEFAULT_CONFIG_PATH: &str = "~/.chordkv/config.yaml";
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 8080;
pub const DEFAULT_REGISTRY_PORT: u16 = 4444;
pub const DEFAULT_RECONCILIATION_INTERVAL: u64 = 600;
pub const DEFAULT_TERMINATING_CHECK_INTERVAL: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PortsConfig {
    pub ring: u16,
    pub rpc: u16,
    pub registry: u16,
    pub replication: u16,
    pub reconciliation: u16,
    pub migration: u16,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            ring: DEFAULT_RING_PORT,
            rpc: DEFAULT_RPC_PORT,
            registry: DEFAULT_REGISTRY_PORT,
            replication: DEFAULT_REPLICATION_PORT,
            reconciliation: DEFAULT_RECONCILIATION_PORT,
            migration: DEFAULT_MIGRATION_PORT,
        }
    }
}

/// Node and registry settings. Durations are in seconds.
///
/// Fields missing from the YAML file take their default value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Host announced on the ring. Every endpoint of the node binds on it.
    pub bind_host: String,
    pub ports: PortsConfig,
    /// Ring address of a node to join through.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,
    /// JSON-RPC endpoint of the registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,
    pub stabilize_interval: u64,
    pub wait_successor_interval: u64,
    pub connection_idle_timeout: u64,
    /// How long a ring or storage request between nodes waits for its reply.
    pub request_timeout: u64,
    pub rpc_timeout: u64,
    pub rpc_retries: usize,
    pub reconciliation_interval: u64,
    pub terminating_check_interval: u64,
    pub rarely_accessed: u64,
    pub rarely_accessed_check_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            ports: PortsConfig::default(),
            join: None,
            registry_url: None,
            stabilize_interval: DEFAULT_STABILIZE_INTERVAL.as_secs(),
            wait_successor_interval: DEFAULT_WAIT_SUCCESSOR_INTERVAL.as_secs(),
            connection_idle_timeout: DEFAULT_CONNECTION_IDLE_TIMEOUT.as_secs(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            rpc_timeout: DEFAULT_RETRY_TIMEOUT.as_secs(),
            rpc_retries: DEFAULT_RETRY_ATTEMPTS,
            reconciliation_interval: DEFAULT_RECONCILIATION_INTERVAL,
            terminating_check_interval: DEFAULT_TERMINATING_CHECK_INTERVAL,
            rarely_accessed: DEFAULT_RARELY_ACCESSED.as_secs(),
            rarely_accessed_check_interval: DEFAULT_RARELY_ACCESSED_CHECK_INTERVAL.as_secs(),
        }
    }
}

impl Config {
    pub fn write_fs<P>(&self, path: P) -> Result<String>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        ensure_parent_dir(&path)?;
        let f =
            fs::File::create(path.as_path()).map_err(|e| Error::CreateFileError(e.to_string()))?;
        let f_writer = io::BufWriter::new(f);
        serde_yaml::to_writer(f_writer, self)?;
        Ok(path.to_string_lossy().to_string())
    }

    pub fn read_fs<P>(path: P) -> Result<Config>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        tracing::debug!("Read config from: {:?}", path);
        let f = fs::File::open(path).map_err(|e| Error::OpenFileError(e.to_string()))?;
        let f_rdr = io::BufReader::new(f);
        Ok(serde_yaml::from_reader(f_rdr)?)
    }

    /// Read `path`, or fall back to the defaults when the file does not exist.
    pub fn read_fs_or_default<P>(path: P) -> Result<Config>
    where P: AsRef<std::path::Path> {
        if expand_home(path.as_ref())?.exists() {
            Self::read_fs(path)
        } else {
            tracing::info!("no config file at {:?}, using defaults", path.as_ref());
            Ok(Self::default())
        }
    }

    /// Ring listener address of this node.
    pub fn ring_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.ports.ring)
    }

    /// JSON-RPC endpoint of the node on `host`; every node uses the same rpc port.
    pub fn rpc_endpoint(&self, host: &str) -> String {
        format!("http://{}:{}", host, self.ports.rpc)
    }

    pub fn port_layout(&self) -> PortLayout {
        PortLayout {
            replication: self.ports.replication,
            reconciliation: self.ports.reconciliation,
            migration: self.ports.migration,
        }
    }

    pub fn retry(&self) -> Retry {
        Retry::new(Duration::from_secs(self.rpc_timeout), self.rpc_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialization_with_missed_field() {
        let yaml = r#"
bind_host: 10.0.0.4
ports:
  ring: 4000
join: 10.0.0.1:3333
stabilize_interval: 3
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.ring_address(), "10.0.0.4:4000");
        assert_eq!(cfg.ports.rpc, DEFAULT_RPC_PORT);
        assert_eq!(cfg.port_layout(), PortLayout::default());
        assert_eq!(cfg.join.as_deref(), Some("10.0.0.1:3333"));
        assert_eq!(cfg.stabilize_interval, 3);
        assert_eq!(cfg.rpc_retries, 5);
        assert_eq!(cfg.request_timeout, 10);
        assert_eq!(cfg.registry_url, None);
    }

    #[test]
    fn test_write_then_read() {
        let path = std::env::temp_dir().join(format!("chordkv-config-{}.yaml", std::process::id()));
        let cfg = Config {
            registry_url: Some("http://10.0.0.9:4444".to_string()),
            ..Default::default()
        };
        cfg.write_fs(&path).unwrap();
        assert_eq!(Config::read_fs(&path).unwrap(), cfg);
        std::fs::remove_file(path).unwrap();
    }
}
