#![warn(missing_docs)]
//! This module provider [SwarmBuilder] and it's interface for
//! [Swarm]

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::consts::DEFAULT_CONNECTION_IDLE_TIMEOUT;
use crate::consts::DEFAULT_REQUEST_TIMEOUT;
use crate::consts::DEFAULT_STABILIZE_INTERVAL;
use crate::dht::NodeInfo;
use crate::dht::RingHandle;
use crate::dht::Stabilizer;
use crate::error::Result;
use crate::swarm::transport::SwarmTransport;
use crate::swarm::Swarm;

/// Creates a SwarmBuilder to configure a Swarm.
pub struct SwarmBuilder {
    address: String,
    idle_timeout: Duration,
    request_timeout: Duration,
    stabilize_interval: Duration,
}

impl SwarmBuilder {
    /// Creates new instance of [SwarmBuilder] for a node announcing `address` (`host:port`).
    pub fn new(address: &str) -> Self {
        SwarmBuilder {
            address: address.to_string(),
            idle_timeout: DEFAULT_CONNECTION_IDLE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stabilize_interval: DEFAULT_STABILIZE_INTERVAL,
        }
    }

    /// Sets up the sliding idle deadline of ring connections.
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Sets up how long a ring or storage request waits for its reply.
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Sets up the pause between two maintenance passes.
    pub fn stabilize_interval(mut self, interval: Duration) -> Self {
        self.stabilize_interval = interval;
        self
    }

    /// Bind the ring listener and start the ring state actor.
    ///
    /// The node identity is derived from the bound address, so a port of 0 yields the
    /// port picked by the OS. Nothing is served until [Swarm::start].
    pub async fn build(self) -> Result<Swarm> {
        let listener = TcpListener::bind(&self.address).await?;
        let me = NodeInfo::new(&listener.local_addr()?.to_string());
        tracing::info!("ring node {} has id {}", me.address, me.id);

        let ring = RingHandle::spawn(me.clone());
        let transport = Arc::new(SwarmTransport::new(self.idle_timeout, self.request_timeout));
        let stabilizer = Arc::new(Stabilizer::new(ring.clone(), transport.clone()));

        Ok(Swarm {
            me,
            ring,
            transport,
            stabilizer,
            stabilize_interval: self.stabilize_interval,
            idle_timeout: self.idle_timeout,
            listener: Some(listener),
            tasks: vec![],
        })
    }
}
