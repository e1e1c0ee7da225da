#![warn(missing_docs)]
//! Implementation of the ring coordination layer
//! which is based on CHORD, ref: <https://pdos.csail.mit.edu/papers/ton:chord/paper-ton.pdf>
//! With high probability, the number of nodes that must be contacted to find a successor in an N-node network is O(log N).

mod chord;
pub mod did;
/// Finger table of one node
pub mod finger;
mod lookup;
mod stabilization;
/// Fallback chain of nearest successors
pub mod successor;
pub mod types;

pub use chord::RingActor;
pub use chord::RingHandle;
pub use chord::RingRequest;
pub use chord::RingState;
pub use did::Did;
pub use finger::FingerTable;
pub use lookup::lookup;
pub use stabilization::Stabilizer;
pub use successor::SuccessorList;
pub use types::host_of;
pub use types::NodeInfo;
pub use types::RingRpc;
