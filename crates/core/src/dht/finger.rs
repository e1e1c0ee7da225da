#![warn(missing_docs)]
use std::ops::Index;

use serde::Deserialize;
use serde::Serialize;

use super::types::NodeInfo;
use crate::consts::FINGER_TABLE_LEN;

/// Finger table of Chord DHT.
///
/// Entry 0 is the local node, entry `i` approximates the owner of `target(id, i)`.
/// Unknown entries hold the zero member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerTable {
    finger: Vec<NodeInfo>,
}

impl FingerTable {
    /// builder
    pub fn new(me: NodeInfo) -> Self {
        let mut finger = vec![NodeInfo::zero(); FINGER_TABLE_LEN];
        finger[0] = me;
        Self { finger }
    }

    /// getter, out of range reads give the zero member
    pub fn get(&self, index: usize) -> NodeInfo {
        self.finger.get(index).cloned().unwrap_or_default()
    }

    /// setter, out of range writes are ignored
    pub fn set(&mut self, index: usize, node: NodeInfo) {
        if let Some(slot) = self.finger.get_mut(index) {
            *slot = node;
        }
    }

    /// Install `node` at `index` unless the same member already sits anywhere in the table.
    /// Returns `true` when the entry was written.
    pub fn set_unique(&mut self, index: usize, node: NodeInfo) -> bool {
        if index >= self.finger.len() || self.contains(&node) {
            return false;
        }
        self.finger[index] = node;
        true
    }

    /// Check finger is contains some node
    pub fn contains(&self, node: &NodeInfo) -> bool {
        self.finger.contains(node)
    }

    /// Count of known entries, the local node included.
    pub fn len(&self) -> usize {
        self.finger.iter().filter(|f| !f.is_zero()).count()
    }

    /// is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// get finger list
    pub fn list(&self) -> &[NodeInfo] {
        &self.finger
    }
}

impl Index<usize> for FingerTable {
    type Output = NodeInfo;
    fn index(&self, index: usize) -> &Self::Output {
        &self.finger[index]
    }
}
