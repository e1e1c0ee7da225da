//! Constant variables.
use std::time::Duration;

/// Bits of the identifier space.
pub const RING_BITS: usize = 256;
/// Finger table entries, index 0 is the local node.
pub const FINGER_TABLE_LEN: usize = RING_BITS + 1;
/// Successor list entries.
pub const SUCCESSOR_LIST_LEN: usize = RING_BITS;
/// Envelope protocol id of the ring maintenance sub-protocol.
pub const RING_PROTOCOL_ID: u32 = 1;
/// Envelope protocol id of the storage node messages exchanged between owners.
pub const STORAGE_PROTOCOL_ID: u32 = 2;

/// Default port of the ring listener.
pub const DEFAULT_RING_PORT: u16 = 3333;
/// Default port of the replication bulk receiver.
pub const DEFAULT_REPLICATION_PORT: u16 = 7777;
/// Default port of the reconciliation bulk receiver.
pub const DEFAULT_RECONCILIATION_PORT: u16 = 6666;
/// Default port of the migration bulk receiver.
pub const DEFAULT_MIGRATION_PORT: u16 = 5555;

/// Pause between two maintenance passes.
pub const DEFAULT_STABILIZE_INTERVAL: Duration = Duration::from_secs(10);
/// Backoff used while a node waits for a successor to appear.
pub const DEFAULT_WAIT_SUCCESSOR_INTERVAL: Duration = Duration::from_secs(10);
/// Sliding idle deadline of ring connections, 3 minutes.
pub const DEFAULT_CONNECTION_IDLE_TIMEOUT: Duration = Duration::from_secs(180);
/// Bound on waiting for the reply of one ring or storage request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Entries not read or written for this long move to the cold tier.
pub const DEFAULT_RARELY_ACCESSED: Duration = Duration::from_secs(30 * 60);
/// How often the offload task scans the store.
pub const DEFAULT_RARELY_ACCESSED_CHECK_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Depth of the ring state actor queue.
pub const RING_ACTOR_QUEUE: usize = 64;
/// Depth of each bulk transfer consumer queue.
pub const TRANSFER_QUEUE: usize = 8;
