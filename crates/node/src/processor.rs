#![warn(missing_docs)]
//! Processor of the chordkv node: one ring node, its storage side and the operations the
//! JSON-RPC endpoint exposes.
use std::sync::Arc;
use std::time::Duration;

use chordkv_core::consts::STORAGE_PROTOCOL_ID;
use chordkv_core::dht::NodeInfo;
use chordkv_core::inspect::NodeInspect;
use chordkv_core::message::AppRegistry;
use chordkv_core::replica::Args;
use chordkv_core::replica::ReplicaManager;
use chordkv_core::storage::EntryStore;
use chordkv_core::swarm::Swarm;
use chordkv_core::swarm::SwarmBuilder;
use chordkv_rpc::Client;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::error::Result;
use crate::native::config::Config;

/// ProcessorBuilder is used to initialize a [Processor] instance.
pub struct ProcessorBuilder {
    config: Config,
    store: Option<EntryStore>,
}

/// Processor for chordkv-node rpc server
pub struct Processor {
    swarm: Swarm,
    replica: ReplicaManager,
    config: Config,
    tasks: Vec<JoinHandle<()>>,
}

impl ProcessorBuilder {
    /// initialize a [ProcessorBuilder] with a [Config].
    pub fn from_config(config: &Config) -> Self {
        Self {
            config: config.clone(),
            store: None,
        }
    }

    /// Set the entry store for the processor.
    pub fn store(mut self, store: EntryStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the [Processor]: bind the ring listener and the bulk receivers and start the
    /// maintenance and offload loops. The node forms a ring of its own until
    /// [Processor::enter_ring] is called.
    pub async fn build(self) -> Result<Processor> {
        let c = self.config;
        let mut swarm = SwarmBuilder::new(&c.ring_address())
            .idle_timeout(Duration::from_secs(c.connection_idle_timeout))
            .request_timeout(Duration::from_secs(c.request_timeout))
            .stabilize_interval(Duration::from_secs(c.stabilize_interval))
            .build()
            .await
            .map_err(Error::RingError)?;

        let store = Arc::new(self.store.unwrap_or_default());
        let replica = ReplicaManager::new(&swarm, store, c.port_layout())
            .with_wait_successor_interval(Duration::from_secs(c.wait_successor_interval));

        let mut apps = AppRegistry::default();
        apps.register(STORAGE_PROTOCOL_ID, Arc::new(replica.clone()))?;
        swarm.start(apps)?;

        let mut tasks = replica.listen(&c.bind_host).await?;
        tasks.push(tokio::spawn(replica.clone().watch_rarely_accessed(
            Duration::from_secs(c.rarely_accessed),
            Duration::from_secs(c.rarely_accessed_check_interval),
        )));

        Ok(Processor {
            swarm,
            replica,
            config: c,
            tasks,
        })
    }
}

impl Processor {
    /// The local ring node.
    pub fn me(&self) -> &NodeInfo {
        self.swarm.me()
    }

    /// The ring node.
    pub fn swarm(&self) -> &Swarm {
        &self.swarm
    }

    /// Storage side of the node.
    pub fn replica(&self) -> &ReplicaManager {
        &self.replica
    }

    /// Enter the ring known to `introducer`, or stay alone when there is none.
    ///
    /// Once stabilization has given the node a predecessor, the predecessor is asked over
    /// JSON-RPC to hand its collection over.
    pub async fn enter_ring(&self, introducer: Option<&str>) -> Result<()> {
        let Some(introducer) = introducer else {
            tracing::info!("no active node to join, {} creates a new ring", self.me().address);
            return Ok(());
        };
        self.swarm
            .join(introducer)
            .await
            .map_err(Error::JoinError)?;

        let predecessor = self.replica.wait_for_predecessor().await?;
        tracing::info!("predecessor is {}, asking for its entries", predecessor.address);
        let client = Client::new(&self.config.rpc_endpoint(predecessor.host()));
        let reply = client.join(&self.me().address).await?;
        tracing::info!("{}", reply);
        Ok(())
    }

    /// Client get.
    pub async fn get(&self, args: &Args) -> Result<String> {
        self.replica.get(args).await.map_err(Error::Storage)
    }

    /// Client put.
    pub async fn put(&self, args: &Args) -> Result<String> {
        self.replica.put(args).await.map_err(Error::Storage)
    }

    /// Client append.
    pub async fn append(&self, args: &Args) -> Result<String> {
        self.replica.append(args).await.map_err(Error::Storage)
    }

    /// Client delete.
    pub async fn delete(&self, args: &Args) -> Result<String> {
        self.replica.delete(args).await.map_err(Error::Storage)
    }

    /// A new successor, whose ring address is `args.value`, asks for our collection.
    pub async fn join(&self, args: &Args) -> Result<String> {
        self.replica
            .join(&args.value)
            .await
            .map_err(Error::Storage)
    }

    /// Hand the collection over before termination.
    pub async fn leave(&self) -> Result<String> {
        self.replica.leave().await.map_err(Error::Storage)
    }

    /// Start a reconciliation walk here.
    pub async fn start_reconciliation(&self) -> Result<String> {
        self.replica
            .start_reconciliation()
            .await
            .map_err(Error::Storage)
    }

    /// get node info
    pub async fn node_info(&self) -> Result<NodeInspect> {
        Ok(NodeInspect::inspect(&self.swarm, self.replica.store()).await?)
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
