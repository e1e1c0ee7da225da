#![warn(missing_docs)]
//! Requests exchanged between storage nodes and the port layout they share.

use chordkv_transport::bulk::TransferClass;
use serde::Deserialize;
use serde::Serialize;

use crate::consts::DEFAULT_MIGRATION_PORT;
use crate::consts::DEFAULT_RECONCILIATION_PORT;
use crate::consts::DEFAULT_REPLICATION_PORT;
use crate::dht::types::host_of;

/// Argument record of every storage request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Args {
    /// Target key.
    pub key: String,
    /// Value for put and append; the joining node address for join.
    #[serde(default)]
    pub value: String,
    /// Ring address of the node owning the key, set while a delete walks the ring.
    #[serde(default)]
    pub handler: String,
    /// Whether the owner found and removed the key.
    #[serde(default)]
    pub deleted: bool,
}

impl Args {
    /// Arguments naming only a key.
    pub fn key(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Default::default()
        }
    }

    /// Arguments naming a key and a value.
    pub fn key_value(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            ..Default::default()
        }
    }
}

/// Owner-side operations invoked by the node that received the client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMessage {
    /// Read at the owner.
    GetImpl(Args),
    /// Write at the owner.
    PutImpl(Args),
    /// Append at the owner.
    AppendImpl(Args),
    /// Delete at the owner, which then starts the ring walk.
    DeleteHandling(Args),
    /// One hop of the delete ring walk.
    DeleteReplicating(Args),
}

impl StorageMessage {
    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            StorageMessage::GetImpl(_) => "GetImpl",
            StorageMessage::PutImpl(_) => "PutImpl",
            StorageMessage::AppendImpl(_) => "AppendImpl",
            StorageMessage::DeleteHandling(_) => "DeleteHandling",
            StorageMessage::DeleteReplicating(_) => "DeleteReplicating",
        }
    }
}

/// Bulk ports shared by every node of the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLayout {
    /// Replication receiver port.
    pub replication: u16,
    /// Reconciliation receiver port.
    pub reconciliation: u16,
    /// Migration receiver port.
    pub migration: u16,
}

impl Default for PortLayout {
    fn default() -> Self {
        Self {
            replication: DEFAULT_REPLICATION_PORT,
            reconciliation: DEFAULT_RECONCILIATION_PORT,
            migration: DEFAULT_MIGRATION_PORT,
        }
    }
}

impl PortLayout {
    /// Port of `class`.
    pub fn port(&self, class: TransferClass) -> u16 {
        match class {
            TransferClass::Replication => self.replication,
            TransferClass::Reconciliation => self.reconciliation,
            TransferClass::Migration => self.migration,
        }
    }

    /// Bulk endpoint of `class` on the node whose ring address is `ring_address`.
    pub fn bulk_address(&self, ring_address: &str, class: TransferClass) -> String {
        format!("{}:{}", host_of(ring_address), self.port(class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_address_keeps_host() {
        let ports = PortLayout::default();
        assert_eq!(
            ports.bulk_address("10.0.0.7:3333", TransferClass::Migration),
            "10.0.0.7:5555"
        );
        assert_eq!(
            ports.bulk_address("10.0.0.7:3333", TransferClass::Replication),
            "10.0.0.7:7777"
        );
    }

    #[test]
    fn test_args_defaults_when_fields_missing() {
        let args: Args = serde_json::from_str(r#"{"key":"k"}"#).unwrap();
        assert_eq!(args, Args::key("k"));
    }
}
