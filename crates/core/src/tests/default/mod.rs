use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::Instant;

use crate::consts::STORAGE_PROTOCOL_ID;
use crate::dht::Did;
use crate::message::AppRegistry;
use crate::replica::PortLayout;
use crate::replica::ReplicaManager;
use crate::storage::EntryStore;
use crate::swarm::Swarm;
use crate::swarm::SwarmBuilder;

mod test_lookup;
mod test_replica;
mod test_stabilization;

/// Each test owns a 127.0.<subnet>.0/24 block, so the shared bulk ports never clash.
pub fn host(subnet: u8, index: u8) -> String {
    format!("127.0.{}.{}", subnet, index + 1)
}

pub struct Node {
    pub swarm: Swarm,
    pub replica: ReplicaManager,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    pub fn address(&self) -> &str {
        &self.swarm.me().address
    }

    pub fn did(&self) -> Did {
        self.swarm.did()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

pub async fn prepare_node(host: &str) -> Node {
    let mut swarm = SwarmBuilder::new(&format!("{}:0", host))
        .stabilize_interval(Duration::from_millis(200))
        .build()
        .await
        .unwrap();
    let replica = ReplicaManager::new(
        &swarm,
        Arc::new(EntryStore::default()),
        PortLayout::default(),
    )
    .with_wait_successor_interval(Duration::from_millis(100));

    let mut apps = AppRegistry::default();
    apps.register(STORAGE_PROTOCOL_ID, Arc::new(replica.clone()))
        .unwrap();
    swarm.start(apps).unwrap();
    let tasks = replica.listen(host).await.unwrap();

    println!("address: {:?}, did: {:?}", swarm.me().address, swarm.did());
    Node {
        swarm,
        replica,
        tasks,
    }
}

/// Start `n` nodes, join them all through the first one and wait for the ring to close.
pub async fn prepare_ring(subnet: u8, n: u8) -> Vec<Node> {
    let mut nodes = vec![];
    for i in 0..n {
        let node = prepare_node(&host(subnet, i)).await;
        if let Some(first) = nodes.first() {
            let first: &Node = first;
            node.swarm.join(first.address()).await.unwrap();
        }
        nodes.push(node);
    }
    let ring = &nodes[..];
    wait_until("ring convergence", move || ring_converged(ring)).await;
    nodes
}

/// Nodes ordered by id, the way they sit on the ring.
pub fn ring_order(nodes: &[Node]) -> Vec<&Node> {
    let mut sorted: Vec<&Node> = nodes.iter().collect();
    sorted.sort_by_key(|n| n.did());
    sorted
}

pub async fn ring_converged(nodes: &[Node]) -> bool {
    let sorted = ring_order(nodes);
    let n = sorted.len();
    if n < 2 {
        return true;
    }
    for (i, node) in sorted.iter().enumerate() {
        let Ok(state) = node.swarm.ring().snapshot().await else {
            return false;
        };
        let next = sorted[(i + 1) % n].address();
        let prev = sorted[(i + n - 1) % n].address();
        if state.successor().address != next || state.predecessor.address != prev {
            return false;
        }
    }
    true
}

/// The node that should own `key` on a converged ring.
pub fn expected_owner<'a>(nodes: &'a [Node], key: &str) -> &'a Node {
    let sorted = ring_order(nodes);
    let digest = Did::digest(key);
    sorted
        .iter()
        .find(|n| n.did() >= digest)
        .copied()
        .unwrap_or(sorted[0])
}

/// The node following `node` on a converged ring.
pub fn successor_of<'a>(nodes: &'a [Node], node: &Node) -> &'a Node {
    let sorted = ring_order(nodes);
    let i = sorted
        .iter()
        .position(|n| n.address() == node.address())
        .unwrap();
    sorted[(i + 1) % sorted.len()]
}

pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(30);
    while Instant::now() < deadline {
        if check().await {
            return;
        }
        sleep(Duration::from_millis(100)).await;
    }
    panic!("timed out waiting for {}", what);
}
