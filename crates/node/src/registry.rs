//! Membership registry: the control plane that knows the live nodes, schedules
//! reconciliation and delivers leave notices.
use std::time::Duration;

use chordkv_core::dht::host_of;
use chordkv_rpc::Client;
use dashmap::DashMap;
use futures::future::join_all;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::native::config::Config;

/// Membership status of a registered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Serving and reachable.
    Active,
    /// Scheduled for termination; waits for its leave notice.
    Terminating,
}

/// Registered nodes, keyed by ring address.
pub struct Registry {
    nodes: DashMap<String, NodeStatus>,
    config: Config,
}

/// Pick a random node of `nodes` other than `me` to join through.
pub fn choose_introducer(nodes: &[String], me: &str) -> Option<String> {
    let others: Vec<&String> = nodes.iter().filter(|n| n.as_str() != me).collect();
    others.choose(&mut rand::thread_rng()).map(|n| n.to_string())
}

impl Registry {
    /// Create an empty registry. Node endpoints are derived from `config.ports.rpc`, and
    /// every call to a node is bounded by `config.rpc_timeout`.
    pub fn new(config: Config) -> Self {
        Self {
            nodes: DashMap::new(),
            config,
        }
    }

    /// Record `address` as active and return every active node, itself included.
    pub fn register(&self, address: &str) -> Vec<String> {
        self.nodes.insert(address.to_string(), NodeStatus::Active);
        tracing::info!("node {} registered", address);
        self.active_nodes()
    }

    /// Ring addresses of the active nodes, sorted.
    pub fn active_nodes(&self) -> Vec<String> {
        self.with_status(NodeStatus::Active)
    }

    /// Membership status of `address`, `None` when it never registered or was dropped.
    pub fn status(&self, address: &str) -> Option<NodeStatus> {
        self.nodes.get(address).map(|s| *s)
    }

    fn with_status(&self, status: NodeStatus) -> Vec<String> {
        let mut nodes: Vec<String> = self
            .nodes
            .iter()
            .filter(|e| *e.value() == status)
            .map(|e| e.key().clone())
            .collect();
        nodes.sort();
        nodes
    }

    /// Schedule `address` for termination. Its leave notice goes out on the next
    /// terminating check.
    pub fn terminate(&self, address: &str) -> Result<String> {
        let Some(mut status) = self.nodes.get_mut(address) else {
            return Err(Error::UnknownNode(address.to_string()));
        };
        *status = NodeStatus::Terminating;
        tracing::info!("node {} scheduled for termination", address);
        Ok(format!("Node {} marked as terminating", address))
    }

    fn client(&self, address: &str) -> Client {
        Client::new(&self.config.rpc_endpoint(host_of(address)))
            .with_timeout(Duration::from_secs(self.config.rpc_timeout))
    }

    /// Ask every active node for its info and forget the ones that do not answer within
    /// `rpc_timeout`. Returns the dropped addresses.
    pub async fn health_check(&self) -> Vec<String> {
        let actives = self.active_nodes();
        let checks = actives.iter().map(|address| async move {
            match self.client(address).node_info().await {
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("node {} failed health check: {}", address, e);
                    Some(address.clone())
                }
            }
        });
        let dropped: Vec<String> = join_all(checks).await.into_iter().flatten().collect();
        for address in dropped.iter() {
            self.nodes.remove(address);
        }
        dropped
    }

    /// Start a reconciliation walk at a random active node. Nothing happens with fewer
    /// than two active nodes. Returns the chosen node.
    pub async fn trigger_reconciliation(&self) -> Result<Option<String>> {
        let actives = self.active_nodes();
        if actives.len() < 2 {
            tracing::debug!("{} active node(s), skip reconciliation", actives.len());
            return Ok(None);
        }
        let Some(chosen) = actives.choose(&mut rand::thread_rng()).cloned() else {
            return Ok(None);
        };
        let reply = self.client(&chosen).start_reconciliation().await?;
        tracing::info!("reconciliation at {}: {}", chosen, reply);
        Ok(Some(chosen))
    }

    /// Deliver `leave` to every terminating node and forget the ones that acknowledged.
    pub async fn deliver_leaves(&self) -> Vec<String> {
        let mut left = vec![];
        for address in self.with_status(NodeStatus::Terminating) {
            // the hand-off may wait for a successor, so it gets a longer bound
            let timeout = self.config.rpc_timeout * self.config.rpc_retries.max(1) as u64;
            let client = self.client(&address).with_timeout(Duration::from_secs(timeout));
            match client.leave().await {
                Ok(reply) => {
                    tracing::info!("{}: {}", address, reply);
                    self.nodes.remove(&address);
                    left.push(address);
                }
                Err(e) => tracing::error!("leave notice to {} failed: {}", address, e),
            }
        }
        left
    }

    /// Run the health, termination and reconciliation loops forever.
    pub async fn run(&self) {
        let check = async {
            loop {
                tokio::time::sleep(Duration::from_secs(self.config.terminating_check_interval))
                    .await;
                self.health_check().await;
                self.deliver_leaves().await;
            }
        };
        let reconcile = async {
            loop {
                tokio::time::sleep(Duration::from_secs(self.config.reconciliation_interval))
                    .await;
                if let Err(e) = self.trigger_reconciliation().await {
                    tracing::error!("failed to start reconciliation: {}", e);
                }
            }
        };
        futures::join!(check, reconcile);
    }
}
