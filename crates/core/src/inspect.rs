//! Snapshots of a node's state, as answered by `node_info` and `/status`.
use serde::Deserialize;
use serde::Serialize;

use crate::dht::RingState;
use crate::error::Result;
use crate::storage::EntryStore;
use crate::swarm::Swarm;

/// Everything a node reports about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInspect {
    /// Open ring connections held in the pool.
    pub connections: usize,
    pub ring: RingInspect,
    pub storage: StorageInspect,
}

/// Position of the node on the ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingInspect {
    /// Node id, hex.
    pub did: String,
    /// Ring address, `host:port`.
    pub address: String,
    /// Known entries of the successor list, in order.
    pub successors: Vec<String>,
    #[serde(default)]
    pub predecessor: Option<String>,
    /// Fingers 1 to 256 as runs of `(address, first, last)`, with the positions
    /// counted from 0 for finger 1. `None` marks unset fingers.
    pub finger_table: Vec<(Option<String>, u64, u64)>,
}

/// Content of the entry store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInspect {
    pub entries: u32,
    /// Stored keys, sorted.
    pub keys: Vec<String>,
}

impl NodeInspect {
    /// Collect the ring and storage snapshots of a running node.
    pub async fn inspect(swarm: &Swarm, store: &EntryStore) -> Result<Self> {
        let ring = RingInspect::inspect(&swarm.ring().snapshot().await?);
        let storage = StorageInspect::inspect(store).await?;
        Ok(Self {
            connections: swarm.transport().connection_count(),
            ring,
            storage,
        })
    }
}

impl RingInspect {
    pub fn inspect(state: &RingState) -> Self {
        let successors = state
            .successors
            .live()
            .map(|s| s.address.clone())
            .collect();

        let predecessor = Some(&state.predecessor)
            .filter(|p| !p.is_zero())
            .map(|p| p.address.clone());

        let finger_table = {
            let finger = state
                .finger
                .list()
                .iter()
                .skip(1)
                .map(|x| Some(x).filter(|x| !x.is_zero()).map(|x| x.address.clone()));
            compress_iter(finger)
        };

        Self {
            did: state.me.id.to_string(),
            address: state.me.address.clone(),
            successors,
            predecessor,
            finger_table,
        }
    }
}

impl StorageInspect {
    pub async fn inspect(store: &EntryStore) -> Result<Self> {
        let mut keys: Vec<String> = store
            .export_all()
            .await?
            .into_iter()
            .map(|e| e.key)
            .collect();
        keys.sort();
        Ok(Self {
            entries: keys.len() as u32,
            keys,
        })
    }
}

/// Collapse consecutive equal items into `(item, first index, last index)` runs.
pub fn compress_iter<T>(iter: impl Iterator<Item = T>) -> Vec<(T, u64, u64)>
where T: PartialEq {
    let mut result = vec![];
    let mut start = 0u64;
    let mut count = 0u64;
    let mut prev: Option<T> = None;

    for (i, x) in iter.enumerate() {
        match prev {
            Some(p) if p == x => {
                count += 1;
            }
            _ => {
                if let Some(p) = prev {
                    result.push((p, start, start + count - 1));
                }
                start = i as u64;
                count = 1;
            }
        }
        prev = Some(x);
    }

    if let Some(p) = prev {
        result.push((p, start, start + count - 1));
    }

    result
}
