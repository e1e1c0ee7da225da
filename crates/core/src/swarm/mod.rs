#![warn(missing_docs)]
//! Ring node management: the listener, the maintenance loop and outbound calls.

mod builder;
/// Outbound ring calls over cached connections
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

pub use builder::SwarmBuilder;
use chordkv_transport::listener::serve;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
pub use transport::SwarmTransport;

use crate::dht::lookup;
use crate::dht::Did;
use crate::dht::NodeInfo;
use crate::dht::RingHandle;
use crate::dht::RingRpc;
use crate::dht::Stabilizer;
use crate::error::Error;
use crate::error::Result;
use crate::message::AppRegistry;
use crate::message::MessageHandler;

/// One ring node: identity, ring state, listener and maintenance loop.
///
/// Dropping the swarm stops its listener, its open connections and its maintenance loop.
pub struct Swarm {
    me: NodeInfo,
    ring: RingHandle,
    transport: Arc<SwarmTransport>,
    stabilizer: Arc<Stabilizer>,
    stabilize_interval: Duration,
    idle_timeout: Duration,
    listener: Option<TcpListener>,
    tasks: Vec<JoinHandle<()>>,
}

impl Swarm {
    /// The local node.
    pub fn me(&self) -> &NodeInfo {
        &self.me
    }

    /// Get did of self.
    pub fn did(&self) -> Did {
        self.me.id
    }

    /// Access to the ring state.
    pub fn ring(&self) -> &RingHandle {
        &self.ring
    }

    /// Outbound transport, shared with applications.
    pub fn transport(&self) -> Arc<SwarmTransport> {
        self.transport.clone()
    }

    /// The maintenance runner.
    pub fn stabilizer(&self) -> Arc<Stabilizer> {
        self.stabilizer.clone()
    }

    /// Serve ring traffic with `apps` and start the maintenance loop.
    ///
    /// A node that never joins forms a ring of its own.
    pub fn start(&mut self, apps: AppRegistry) -> Result<()> {
        let Some(listener) = self.listener.take() else {
            return Err(Error::AlreadyStarted);
        };
        let handler = Arc::new(MessageHandler::new(self.ring.clone(), Arc::new(apps)));
        self.tasks
            .push(tokio::spawn(serve(listener, handler, self.idle_timeout)));
        self.tasks.push(tokio::spawn(
            self.stabilizer.clone().wait(self.stabilize_interval),
        ));
        tracing::info!("ring node {} started", self.me.address);
        Ok(())
    }

    /// Enter the ring known to `introducer`: find the owner of our own id through it and
    /// take that node as successor. Stabilization does the rest.
    pub async fn join(&self, introducer: &str) -> Result<()> {
        let owner = lookup(self.transport.as_ref(), self.me.id, introducer).await?;
        if owner == self.me.address {
            tracing::warn!("{} answered that we own our own id, nothing to join", introducer);
            return Ok(());
        }
        let id = self.transport.get_id(&owner).await?;
        self.ring
            .set_successor(NodeInfo::with_id(id, &owner))
            .await?;
        tracing::info!("joined the ring through {}, successor is {}", introducer, owner);
        Ok(())
    }

    /// Ring address of the owner of `key`, walking from `start`.
    pub async fn lookup(&self, key: Did, start: &str) -> Result<String> {
        lookup(self.transport.as_ref(), key, start).await
    }

    /// Ring address of the owner of the string key `key`, walking from this node.
    pub async fn lookup_key(&self, key: &str) -> Result<String> {
        self.lookup(Did::digest(key), &self.me.address).await
    }

    /// Stop serving and maintaining.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Swarm {
    fn drop(&mut self) {
        self.shutdown();
    }
}
