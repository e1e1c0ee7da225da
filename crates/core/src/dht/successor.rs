//! Successor list, the fallback chain used when the successor stops answering.
use serde::Deserialize;
use serde::Serialize;

use super::types::NodeInfo;
use crate::consts::SUCCESSOR_LIST_LEN;

/// Ordered nearest successors. Entry 0 is the successor itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessorList {
    list: Vec<NodeInfo>,
}

impl Default for SuccessorList {
    fn default() -> Self {
        Self {
            list: vec![NodeInfo::zero(); SUCCESSOR_LIST_LEN],
        }
    }
}

impl SuccessorList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry `index`, zero when out of range.
    pub fn get(&self, index: usize) -> NodeInfo {
        self.list.get(index).cloned().unwrap_or_default()
    }

    /// Overwrite entry `index`. Out of range writes are ignored.
    pub fn set(&mut self, index: usize, node: NodeInfo) {
        if let Some(slot) = self.list.get_mut(index) {
            *slot = node;
        }
    }

    /// Rebuild entries `1..` from the successor's own list: `list[i + 1] = fetched[i]`.
    /// Entries the fetched list does not reach are cleared.
    pub fn adopt(&mut self, fetched: &[NodeInfo]) {
        for i in 1..self.list.len() {
            self.list[i] = fetched.get(i - 1).cloned().unwrap_or_default();
        }
    }

    /// All entries.
    pub fn list(&self) -> &[NodeInfo] {
        &self.list
    }

    /// Known entries, in order.
    pub fn live(&self) -> impl Iterator<Item = &NodeInfo> {
        self.list.iter().filter(|n| !n.is_zero())
    }
}
