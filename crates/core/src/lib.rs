//! chordkv: a Chord ring of key-value stores.
//! --------------
//! - [Chord](crate::dht) places nodes and keys on a 256-bit identifier circle, resolves the
//!   owner of a key and keeps the ring consistent with a periodic maintenance pass.
//! - [Message](crate::message) is the framed wire format spoken on the ring listener.
//! - [Swarm](crate::swarm) runs one node: listener, maintenance loop and outbound calls.
//! - [Storage](crate::storage) keeps timestamped entries with a cold tier for idle ones.
//! - [Replica](crate::replica) routes client operations to owners and moves data between
//!   nodes: replication, reconciliation, migration and delete propagation.
//!
//! # Ring
//!
//! A node identifier is the SHA-256 digest of its `host:port` address, and the owner of a
//! key is the first node whose identifier follows the key digest on the circle. Each node
//! keeps a predecessor, a finger table and a successor list; [dht::Stabilizer] repairs them
//! every few seconds so joins and crashes are absorbed without coordination.
//!
//! # Data movement
//!
//! Writes land on the owner and are pushed to its successor. Whole collections travel on
//! three dedicated TCP ports with a 10 byte ASCII length header:
//!
//! ```txt
//! replication    one entry to the successor after each write
//! reconciliation the whole store walking the ring twice
//! migration      the whole store to a joining node or to the successor of a leaving one
//! ```
//!
//! Concurrent updates of one key are merged with a last-writer-wins rule on the entry
//! timestamp.
pub mod consts;
pub mod dht;
pub mod error;
pub mod inspect;
pub mod message;
pub mod replica;
pub mod storage;
pub mod swarm;
#[cfg(test)]
mod tests;
pub use async_trait::async_trait;
pub use futures;
