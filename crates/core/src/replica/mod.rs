//! Replication, reconciliation, migration and delete propagation.
//!
//! Every node runs one [ReplicaManager]. It answers the storage requests other nodes route
//! to it, pushes each local write to the successor, hands whole collections over on join
//! and leave, and takes part in the reconciliation walk around the ring.

pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chordkv_transport::bulk::BulkReceiver;
use chordkv_transport::bulk::BulkSender;
use chordkv_transport::bulk::Transfer;
use chordkv_transport::bulk::TransferClass;
use futures_timer::Delay;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub use self::types::Args;
pub use self::types::PortLayout;
pub use self::types::StorageMessage;
use crate::consts::DEFAULT_WAIT_SUCCESSOR_INTERVAL;
use crate::consts::STORAGE_PROTOCOL_ID;
use crate::consts::TRANSFER_QUEUE;
use crate::dht::lookup;
use crate::dht::Did;
use crate::dht::NodeInfo;
use crate::dht::RingHandle;
use crate::error::Error;
use crate::error::Result;
use crate::message::Application;
use crate::storage::entry::from_payload;
use crate::storage::entry::to_payload;
use crate::storage::EntryStore;
use crate::swarm::Swarm;
use crate::swarm::SwarmTransport;

/// Reply of a get on a lone node that misses the key.
pub const KEY_NOT_FOUND: &str = "Key not found.";
/// Reply of an owner-side get or append that misses the key.
pub const ENTRY_NOT_FOUND: &str = "Entry not found";
/// Reply of a successful append.
pub const VALUE_APPENDED: &str = "Value correctly appended";
/// Reply of the owner after a successful delete.
pub const ENTRY_DELETED: &str = "Entry successfully deleted";
/// Reply of the owner when the key to delete does not exist.
pub const DELETE_MISSING: &str = "The key searched for deletion does not exist";
/// Reply when the delete walk returns to the owner after a delete.
pub const DELETE_RETURNED: &str = "Entry succesfully deleted";
/// Reply when the delete walk returns to the owner that found nothing.
pub const DELETE_RETURNED_MISSING: &str = "Entry to delete not found";
/// Reply of a reconciliation request on a node without successor.
pub const NO_SUCCESSOR: &str =
    "Node hasn't a successor, abort and wait for the reconstruction of the DHT.";
/// Reply of a reconciliation request that started the walk.
pub const RECONCILIATION_STARTED: &str = "Reconciliation started";
/// Reply of a leave request once the collection is handed over.
pub const LEAVE_DONE: &str = "Instance can now safely leave the chord ring";
/// Reply of a join request once the collection is handed over.
pub const JOIN_DONE: &str = "Instance succesfully inserted in chord ring";

/// Reconciliation walk bookkeeping.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconState {
    /// This node started the current walk.
    pub handler: bool,
    /// Laps completed back at the handler.
    pub round: u32,
}

impl ReconState {
    /// Record that a reconciliation payload arrived and say whether to forward it.
    /// The handler stops the walk when the payload comes back the second time.
    pub fn advance(&mut self) -> bool {
        if !self.handler {
            return true;
        }
        self.round += 1;
        if self.round >= 2 {
            *self = Self::default();
            return false;
        }
        true
    }
}

/// Storage side of a ring node.
#[derive(Clone)]
pub struct ReplicaManager {
    me: NodeInfo,
    ring: RingHandle,
    transport: Arc<SwarmTransport>,
    store: Arc<EntryStore>,
    sender: BulkSender,
    ports: PortLayout,
    send_lock: Arc<Mutex<()>>,
    recon: Arc<Mutex<ReconState>>,
    wait_successor_interval: Duration,
    predecessor_tx: Arc<watch::Sender<NodeInfo>>,
}

impl ReplicaManager {
    /// Manager for the node run by `swarm`.
    pub fn new(swarm: &Swarm, store: Arc<EntryStore>, ports: PortLayout) -> Self {
        let (predecessor_tx, _) = watch::channel(NodeInfo::zero());
        Self {
            me: swarm.me().clone(),
            ring: swarm.ring().clone(),
            transport: swarm.transport(),
            store,
            sender: BulkSender::default(),
            ports,
            send_lock: Arc::new(Mutex::new(())),
            recon: Arc::new(Mutex::new(ReconState::default())),
            wait_successor_interval: DEFAULT_WAIT_SUCCESSOR_INTERVAL,
            predecessor_tx: Arc::new(predecessor_tx),
        }
    }

    /// Backoff used while waiting for a successor.
    pub fn with_wait_successor_interval(mut self, interval: Duration) -> Self {
        self.wait_successor_interval = interval;
        self
    }

    /// Use `sender` for bulk transfers.
    pub fn with_sender(mut self, sender: BulkSender) -> Self {
        self.sender = sender;
        self
    }

    /// The local entry store.
    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    /// Current reconciliation bookkeeping.
    pub async fn recon_state(&self) -> ReconState {
        *self.recon.lock().await
    }

    async fn wait_for_successor(&self) -> Result<NodeInfo> {
        loop {
            let successor = self.ring.successor().await?;
            if !successor.is_zero() {
                return Ok(successor);
            }
            tracing::warn!("node has no successor, wait for the reconstruction of the ring");
            Delay::new(self.wait_successor_interval).await;
        }
    }

    /// Resolve once this node has a predecessor.
    pub async fn wait_for_predecessor(&self) -> Result<NodeInfo> {
        let mut rx = self.predecessor_tx.subscribe();
        loop {
            let predecessor = self.ring.predecessor().await?;
            if !predecessor.is_zero() {
                return Ok(predecessor);
            }
            rx.changed().await.map_err(|_| Error::RingActorStopped)?;
        }
    }

    async fn remote(&self, address: &str, msg: StorageMessage) -> Result<String> {
        tracing::debug!("{} sent to {}", msg.name(), address);
        let payload = bincode::serialize(&msg).map_err(Error::BincodeSerialize)?;
        let reply = self
            .transport
            .request_app(address, STORAGE_PROTOCOL_ID, payload.into())
            .await?;
        let reply: std::result::Result<String, String> =
            bincode::deserialize(&reply).map_err(Error::BincodeDeserialize)?;
        reply.map_err(Error::RemoteStorage)
    }

    /// Run `msg` at `owner`, in process when the owner is this node.
    async fn dispatch(&self, owner: &str, msg: StorageMessage) -> Result<String> {
        if owner == self.me.address {
            self.handle_storage(msg).await
        } else {
            self.remote(owner, msg).await
        }
    }

    /// Owner-side handling of a storage request.
    pub async fn handle_storage(&self, msg: StorageMessage) -> Result<String> {
        match msg {
            StorageMessage::GetImpl(args) => self.get_impl(&args).await,
            StorageMessage::PutImpl(args) => self.put_impl(&args).await,
            StorageMessage::AppendImpl(args) => self.append_impl(&args).await,
            StorageMessage::DeleteHandling(args) => self.delete_handling(args).await,
            StorageMessage::DeleteReplicating(args) => self.delete_replicating(args).await,
        }
    }

    /// Client get: answer locally when possible, otherwise ask the owner.
    pub async fn get(&self, args: &Args) -> Result<String> {
        tracing::info!("received get for key {}", args.key);
        if let Some(entry) = self.store.get(&args.key).await? {
            return Ok(entry.format_client());
        }
        tracing::info!("key {} not found on local storage", args.key);

        let successor = self.ring.successor().await?;
        if successor.is_zero() {
            return Ok(KEY_NOT_FOUND.to_string());
        }
        let owner = lookup(
            self.transport.as_ref(),
            Did::digest(&args.key),
            &successor.address,
        )
        .await?;
        self.dispatch(&owner, StorageMessage::GetImpl(args.clone()))
            .await
    }

    /// Client put, routed to the owner of the key.
    pub async fn put(&self, args: &Args) -> Result<String> {
        tracing::info!("received put for key {}", args.key);
        let owner = self.owner_of(&args.key).await?;
        self.dispatch(&owner, StorageMessage::PutImpl(args.clone()))
            .await
    }

    /// Client append, routed to the owner of the key.
    pub async fn append(&self, args: &Args) -> Result<String> {
        tracing::info!("received append for key {}", args.key);
        let owner = self.owner_of(&args.key).await?;
        self.dispatch(&owner, StorageMessage::AppendImpl(args.clone()))
            .await
    }

    /// Client delete: the owner deletes, then the request walks the whole ring.
    pub async fn delete(&self, args: &Args) -> Result<String> {
        tracing::info!("received delete for key {}", args.key);
        let owner = self.owner_of(&args.key).await?;
        let args = Args {
            handler: owner.clone(),
            deleted: false,
            ..args.clone()
        };
        tracing::info!("delete request forwarded to handling node {}", owner);
        self.dispatch(&owner, StorageMessage::DeleteHandling(args))
            .await
    }

    async fn owner_of(&self, key: &str) -> Result<String> {
        lookup(self.transport.as_ref(), Did::digest(key), &self.me.address).await
    }

    async fn get_impl(&self, args: &Args) -> Result<String> {
        Ok(match self.store.get(&args.key).await? {
            Some(entry) => entry.format_client(),
            None => ENTRY_NOT_FOUND.to_string(),
        })
    }

    async fn put_impl(&self, args: &Args) -> Result<String> {
        let outcome = self.store.put(&args.key, &args.value).await?;
        self.spawn_replicate(&args.key);
        Ok(outcome.message().to_string())
    }

    async fn append_impl(&self, args: &Args) -> Result<String> {
        match self.store.append(&args.key, &args.value).await {
            Ok(()) => {
                self.spawn_replicate(&args.key);
                Ok(VALUE_APPENDED.to_string())
            }
            Err(Error::EntryNotFound(_)) => Ok(ENTRY_NOT_FOUND.to_string()),
            Err(e) => Err(e),
        }
    }

    async fn delete_handling(&self, mut args: Args) -> Result<String> {
        tracing::info!("deleting {} as handling node", args.key);
        match self.store.delete(&args.key).await {
            Ok(()) => args.deleted = true,
            Err(Error::EntryNotFound(_)) => {
                tracing::info!("{}: {}", DELETE_MISSING, args.key);
                return Ok(DELETE_MISSING.to_string());
            }
            Err(e) => return Err(e),
        }

        let this = self.clone();
        tokio::spawn(async move {
            match this.forward_delete(args).await {
                Ok(status) => tracing::info!("delete walk finished: {}", status),
                Err(e) => tracing::error!("delete walk failed: {}", e),
            }
        });
        Ok(ENTRY_DELETED.to_string())
    }

    async fn delete_replicating(&self, args: Args) -> Result<String> {
        if args.handler == self.me.address {
            tracing::info!("delete request returned to the handling node");
            return Ok(if args.deleted {
                DELETE_RETURNED.to_string()
            } else {
                DELETE_RETURNED_MISSING.to_string()
            });
        }

        tracing::info!("deleting replicated {}", args.key);
        if let Err(e) = self.store.delete(&args.key).await {
            tracing::debug!("no replica of {} here: {}", args.key, e);
        }
        self.forward_delete(args).await
    }

    /// Pass the delete walk to the successor, waiting for one if needed. Resolves to
    /// the status produced when the walk gets back to the owner.
    pub async fn forward_delete(&self, args: Args) -> Result<String> {
        let successor = self.wait_for_successor().await?;
        tracing::info!("delete request forwarded to {}", successor.address);
        self.remote(&successor.address, StorageMessage::DeleteReplicating(args))
            .await
    }

    fn spawn_replicate(&self, key: &str) {
        let this = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = this.replicate(&key).await {
                tracing::error!("failed to replicate {}: {}", key, e);
            }
        });
    }

    /// Push the entry under `key` to the successor.
    pub async fn replicate(&self, key: &str) -> Result<()> {
        let successor = self.ring.successor().await?;
        if successor.is_zero() {
            tracing::info!("node has no successor yet, {} will be replicated later", key);
            return Ok(());
        }
        self.send_collection(&successor.address, TransferClass::Replication, Some(key))
            .await?;
        tracing::info!("replica of {} sent to {}", key, successor.address);
        Ok(())
    }

    /// Export the whole store, or the single entry `key`, and ship it to the `class`
    /// receiver of the node at `ring_address`. Sends from one node never overlap.
    pub async fn send_collection(
        &self,
        ring_address: &str,
        class: TransferClass,
        key: Option<&str>,
    ) -> Result<()> {
        let _guard = self.send_lock.lock().await;
        let entries = match key {
            Some(key) => self.store.export_one(key).await?,
            None => self.store.export_all().await?,
        };
        let payload = to_payload(&entries)?;
        let address = self.ports.bulk_address(ring_address, class);
        tracing::info!(
            "sending {} message with {} entries to {}",
            class,
            entries.len(),
            address
        );
        self.sender.send(&address, class, &payload).await?;
        Ok(())
    }

    /// Start a reconciliation walk with this node as handler.
    pub async fn start_reconciliation(&self) -> Result<String> {
        tracing::info!("reconciliation requested");
        let successor = self.ring.successor().await?;
        if successor.is_zero() {
            tracing::warn!("{}", NO_SUCCESSOR);
            return Ok(NO_SUCCESSOR.to_string());
        }
        self.recon.lock().await.handler = true;
        self.send_collection(&successor.address, TransferClass::Reconciliation, None)
            .await?;
        Ok(RECONCILIATION_STARTED.to_string())
    }

    /// Hand the whole collection to the successor before this node goes away.
    pub async fn leave(&self) -> Result<String> {
        tracing::info!("instance scheduled for termination, sending entries to successor");
        let successor = self.wait_for_successor().await?;
        self.send_collection(&successor.address, TransferClass::Migration, None)
            .await?;
        tracing::info!("{}", LEAVE_DONE);
        Ok(LEAVE_DONE.to_string())
    }

    /// Hand the whole collection to `new_node`, which just became our successor.
    pub async fn join(&self, new_node: &str) -> Result<String> {
        tracing::info!("{} is joining, sending entries", new_node);
        self.send_collection(new_node, TransferClass::Migration, None)
            .await?;
        tracing::info!("{}", JOIN_DONE);
        Ok(JOIN_DONE.to_string())
    }

    /// Apply one received transfer.
    pub async fn on_transfer(&self, transfer: Transfer) -> Result<()> {
        let entries = from_payload(&transfer.payload)?;
        tracing::info!("{} message with {} entries received", transfer.class, entries.len());
        match transfer.class {
            TransferClass::Replication | TransferClass::Migration => {
                self.store.merge_import(entries).await
            }
            TransferClass::Reconciliation => {
                self.store.reconcile_import(entries).await?;
                drop(transfer);
                self.forward_reconciliation().await
            }
        }
    }

    async fn forward_reconciliation(&self) -> Result<()> {
        let successor = self.wait_for_successor().await?;
        if !self.recon.lock().await.advance() {
            tracing::info!("reconciliation returned to its handler twice, ring updated");
            return Ok(());
        }
        tracing::info!("reconciled collection forwarded to {}", successor.address);
        self.send_collection(&successor.address, TransferClass::Reconciliation, None)
            .await
    }

    /// Bind the three bulk receivers on `host` and start consuming what they deliver.
    pub async fn listen(&self, host: &str) -> Result<Vec<JoinHandle<()>>> {
        let mut tasks = vec![];
        for class in TransferClass::ALL {
            let listener = TcpListener::bind(format!("{}:{}", host, self.ports.port(class))).await?;
            let (tx, rx) = mpsc::channel(TRANSFER_QUEUE);
            let receiver = BulkReceiver::new(class, Arc::new(Mutex::new(())));
            tasks.push(tokio::spawn(receiver.run(listener, tx)));
            tasks.push(tokio::spawn(self.clone().consume(rx)));
        }
        Ok(tasks)
    }

    async fn consume(self, mut rx: mpsc::Receiver<Transfer>) {
        while let Some(transfer) = rx.recv().await {
            let class = transfer.class;
            if let Err(e) = self.on_transfer(transfer).await {
                tracing::error!("failed to apply {} message: {}", class, e);
            }
        }
    }

    /// Move idle entries to the cold tier every `interval`.
    pub async fn watch_rarely_accessed(self, threshold: Duration, interval: Duration) {
        loop {
            Delay::new(interval).await;
            tracing::debug!("checking rarely accessed entries");
            match self.store.offload_rarely_accessed(threshold).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("{} entries moved to the cold tier", n),
                Err(e) => tracing::error!("failed to offload entries: {}", e),
            }
        }
    }
}

#[async_trait]
impl Application for ReplicaManager {
    async fn on_message(&self, payload: Bytes) -> Option<Bytes> {
        let msg: StorageMessage = match bincode::deserialize(&payload) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("malformed storage request dropped: {}", e);
                return None;
            }
        };
        let reply = self
            .handle_storage(msg)
            .await
            .map_err(|e| e.to_string());
        bincode::serialize(&reply).ok().map(Bytes::from)
    }

    async fn on_predecessor_changed(&self, id: Did, address: &str) {
        tracing::info!("predecessor changed to {}, replica boundaries moved", address);
        self.predecessor_tx
            .send_replace(NodeInfo::with_id(id, address));
    }
}
