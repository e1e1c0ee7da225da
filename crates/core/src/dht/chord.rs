//! Ring state and the task owning it.
#![warn(missing_docs)]
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use super::finger::FingerTable;
use super::successor::SuccessorList;
use super::types::NodeInfo;
use super::Did;
use crate::consts::RING_ACTOR_QUEUE;
use crate::error::Error;
use crate::error::Result;

/// Ring-relative state of one node.
///
/// The successor is stored twice, as `finger[1]` and `successors[0]`; every write goes
/// through [RingState::set_successor] so both copies stay identical.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingState {
    /// The local node.
    pub me: NodeInfo,
    /// Previous node on the ring, zero when unknown.
    pub predecessor: NodeInfo,
    /// Shortcuts across the ring, `finger[0]` is `me`.
    pub finger: FingerTable,
    /// Fallback chain of nearest successors.
    pub successors: SuccessorList,
}

impl RingState {
    /// Fresh state: no predecessor, no successor.
    pub fn new(me: NodeInfo) -> Self {
        Self {
            finger: FingerTable::new(me.clone()),
            successors: SuccessorList::new(),
            predecessor: NodeInfo::zero(),
            me,
        }
    }

    /// Next node on the ring.
    pub fn successor(&self) -> NodeInfo {
        self.finger.get(1)
    }

    /// Replace the successor in every place it is stored.
    pub fn set_successor(&mut self, node: NodeInfo) {
        self.finger.set(1, node.clone());
        self.successors.set(0, node);
    }

    /// Write a finger. Index 1 is the successor; higher indices skip members the table
    /// already holds. Returns `true` when something was written.
    pub fn set_finger(&mut self, index: usize, node: NodeInfo) -> bool {
        match index {
            0 => false,
            1 => {
                self.set_successor(node);
                true
            }
            _ => self.finger.set_unique(index, node),
        }
    }

    /// Write one successor list entry. Index 0 is the successor.
    pub fn set_successor_entry(&mut self, index: usize, node: NodeInfo) {
        if index == 0 {
            self.set_successor(node);
        } else {
            self.successors.set(index, node);
        }
    }

    /// Accept `candidate` as predecessor when there is none, or when it sits strictly
    /// between the current predecessor and this node. A node with no successor also
    /// adopts the new predecessor as successor. Returns `true` when accepted.
    pub fn offer_predecessor(&mut self, candidate: NodeInfo) -> bool {
        if candidate.is_zero() || candidate.address == self.me.address {
            return false;
        }
        let accept = self.predecessor.is_zero()
            || candidate.id.in_range(self.predecessor.id, self.me.id);
        if !accept {
            return false;
        }
        if self.successor().is_zero() {
            self.set_successor(candidate.clone());
        }
        self.predecessor = candidate;
        true
    }
}

/// Requests understood by the [RingActor].
#[derive(Debug)]
pub enum RingRequest {
    /// Read the predecessor.
    Predecessor(oneshot::Sender<NodeInfo>),
    /// Overwrite the predecessor.
    SetPredecessor(NodeInfo, oneshot::Sender<()>),
    /// Read the successor.
    Successor(oneshot::Sender<NodeInfo>),
    /// Read one finger.
    Finger(usize, oneshot::Sender<NodeInfo>),
    /// Write one finger, answering whether it was written.
    SetFinger(usize, NodeInfo, oneshot::Sender<bool>),
    /// Read the whole finger table.
    Fingers(oneshot::Sender<Vec<NodeInfo>>),
    /// Read one successor list entry.
    SuccessorEntry(usize, oneshot::Sender<NodeInfo>),
    /// Write one successor list entry.
    SetSuccessorEntry(usize, NodeInfo, oneshot::Sender<()>),
    /// Read the whole successor list.
    Successors(oneshot::Sender<Vec<NodeInfo>>),
    /// Rebuild the successor list tail from the successor's own list.
    AdoptSuccessors(Vec<NodeInfo>, oneshot::Sender<()>),
    /// Predecessor compare-and-set, see [RingState::offer_predecessor].
    OfferPredecessor(NodeInfo, oneshot::Sender<bool>),
    /// Copy of the whole state.
    Snapshot(oneshot::Sender<RingState>),
}

/// Single owner of a node's [RingState].
///
/// Every read and write arrives as a [RingRequest] and is answered before the next one
/// is taken, so no caller ever observes a half-applied update. The actor never calls
/// out while serving a request, so a request can not wait on another one.
pub struct RingActor {
    state: RingState,
    request_rx: mpsc::Receiver<RingRequest>,
}

impl RingActor {
    /// Wrap `state`, serving requests from `request_rx`.
    pub fn new(state: RingState, request_rx: mpsc::Receiver<RingRequest>) -> Self {
        Self { state, request_rx }
    }

    /// Serve until every [RingHandle] is dropped.
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            self.handle_request(request);
        }
        tracing::debug!("ring actor of {} shutting down", self.state.me);
    }

    fn handle_request(&mut self, request: RingRequest) {
        let state = &mut self.state;
        match request {
            RingRequest::Predecessor(reply) => {
                let _ = reply.send(state.predecessor.clone());
            }
            RingRequest::SetPredecessor(node, reply) => {
                state.predecessor = node;
                let _ = reply.send(());
            }
            RingRequest::Successor(reply) => {
                let _ = reply.send(state.successor());
            }
            RingRequest::Finger(index, reply) => {
                let _ = reply.send(state.finger.get(index));
            }
            RingRequest::SetFinger(index, node, reply) => {
                let _ = reply.send(state.set_finger(index, node));
            }
            RingRequest::Fingers(reply) => {
                let _ = reply.send(state.finger.list().to_vec());
            }
            RingRequest::SuccessorEntry(index, reply) => {
                let _ = reply.send(state.successors.get(index));
            }
            RingRequest::SetSuccessorEntry(index, node, reply) => {
                state.set_successor_entry(index, node);
                let _ = reply.send(());
            }
            RingRequest::Successors(reply) => {
                let _ = reply.send(state.successors.list().to_vec());
            }
            RingRequest::AdoptSuccessors(fetched, reply) => {
                state.successors.adopt(&fetched);
                let _ = reply.send(());
            }
            RingRequest::OfferPredecessor(node, reply) => {
                let _ = reply.send(state.offer_predecessor(node));
            }
            RingRequest::Snapshot(reply) => {
                let _ = reply.send(state.clone());
            }
        }
    }
}

/// Cloneable access point to a running [RingActor].
#[derive(Clone, Debug)]
pub struct RingHandle {
    me: NodeInfo,
    request_tx: mpsc::Sender<RingRequest>,
}

impl RingHandle {
    /// Start the actor for `me` on the current tokio runtime.
    pub fn spawn(me: NodeInfo) -> Self {
        let (request_tx, request_rx) = mpsc::channel(RING_ACTOR_QUEUE);
        let actor = RingActor::new(RingState::new(me.clone()), request_rx);
        tokio::spawn(actor.run());
        Self { me, request_tx }
    }

    /// The local node. Never changes, so it is answered without a round trip.
    pub fn me(&self) -> &NodeInfo {
        &self.me
    }

    /// Identifier of the local node.
    pub fn did(&self) -> Did {
        self.me.id
    }

    async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> RingRequest) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| Error::RingActorStopped)?;
        reply_rx.await.map_err(|_| Error::RingActorStopped)
    }

    /// Read the predecessor.
    pub async fn predecessor(&self) -> Result<NodeInfo> {
        self.ask(RingRequest::Predecessor).await
    }

    /// Overwrite the predecessor.
    pub async fn set_predecessor(&self, node: NodeInfo) -> Result<()> {
        self.ask(|tx| RingRequest::SetPredecessor(node, tx)).await
    }

    /// Read the successor.
    pub async fn successor(&self) -> Result<NodeInfo> {
        self.ask(RingRequest::Successor).await
    }

    /// Replace the successor.
    pub async fn set_successor(&self, node: NodeInfo) -> Result<()> {
        self.ask(|tx| RingRequest::SetFinger(1, node, tx)).await.map(|_| ())
    }

    /// Read finger `index`.
    pub async fn finger(&self, index: usize) -> Result<NodeInfo> {
        self.ask(|tx| RingRequest::Finger(index, tx)).await
    }

    /// Write finger `index`, skipping members already present.
    pub async fn set_finger(&self, index: usize, node: NodeInfo) -> Result<bool> {
        self.ask(|tx| RingRequest::SetFinger(index, node, tx)).await
    }

    /// Read the whole finger table.
    pub async fn fingers(&self) -> Result<Vec<NodeInfo>> {
        self.ask(RingRequest::Fingers).await
    }

    /// Read successor list entry `index`.
    pub async fn successor_entry(&self, index: usize) -> Result<NodeInfo> {
        self.ask(|tx| RingRequest::SuccessorEntry(index, tx)).await
    }

    /// Write successor list entry `index`.
    pub async fn set_successor_entry(&self, index: usize, node: NodeInfo) -> Result<()> {
        self.ask(|tx| RingRequest::SetSuccessorEntry(index, node, tx)).await
    }

    /// Read the whole successor list.
    pub async fn successors(&self) -> Result<Vec<NodeInfo>> {
        self.ask(RingRequest::Successors).await
    }

    /// Rebuild the successor list tail from the successor's own list.
    pub async fn adopt_successors(&self, fetched: Vec<NodeInfo>) -> Result<()> {
        self.ask(|tx| RingRequest::AdoptSuccessors(fetched, tx)).await
    }

    /// Predecessor compare-and-set. Returns `true` when `candidate` was accepted.
    pub async fn offer_predecessor(&self, candidate: NodeInfo) -> Result<bool> {
        self.ask(|tx| RingRequest::OfferPredecessor(candidate, tx)).await
    }

    /// Copy of the whole state.
    pub async fn snapshot(&self) -> Result<RingState> {
        self.ask(RingRequest::Snapshot).await
    }
}
