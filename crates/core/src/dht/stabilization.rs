//! Stabilization run daemons to maintain dht.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::chord::RingHandle;
use super::lookup::lookup;
use super::types::NodeInfo;
use super::types::RingRpc;
use crate::consts::RING_BITS;
use crate::consts::SUCCESSOR_LIST_LEN;
use crate::error::Result;

/// The stabilization runner.
#[derive(Clone)]
pub struct Stabilizer {
    ring: RingHandle,
    rpc: Arc<dyn RingRpc>,
    fix_index: Arc<AtomicUsize>,
}

impl Stabilizer {
    /// Create a new stabilization runner.
    pub fn new(ring: RingHandle, rpc: Arc<dyn RingRpc>) -> Self {
        Self {
            ring,
            rpc,
            fix_index: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run one maintenance pass: stabilize, check predecessor, fix one finger.
    /// A failing step is logged and does not stop the others.
    pub async fn stabilize(&self) -> Result<()> {
        tracing::debug!("STABILIZATION stabilize start");
        if let Err(e) = self.stabilize_successor().await {
            tracing::error!("[stabilize] Failed on stabilize {:?}", e);
        }
        tracing::debug!("STABILIZATION stabilize end");
        tracing::debug!("STABILIZATION check_predecessor start");
        if let Err(e) = self.check_predecessor().await {
            tracing::error!("[stabilize] Failed on check predecessor {:?}", e);
        }
        tracing::debug!("STABILIZATION check_predecessor end");
        tracing::debug!("STABILIZATION fix_fingers start");
        let which = self.next_fix_index();
        if let Err(e) = self.fix(which).await {
            tracing::error!("[stabilize] Failed on fix finger {} {:?}", which, e);
        }
        tracing::debug!("STABILIZATION fix_fingers end");
        Ok(())
    }

    /// Finger index for this pass. Starts at 0, then cycles through `1..=256`.
    fn next_fix_index(&self) -> usize {
        let current = self.fix_index.load(Ordering::SeqCst);
        self.fix_index
            .store(current % RING_BITS + 1, Ordering::SeqCst);
        current
    }

    /// Make sure the successor is alive, refresh the successor list, adopt a closer
    /// successor if the current one knows of it, then claim to be its predecessor.
    pub async fn stabilize_successor(&self) -> Result<()> {
        let me = self.ring.me().clone();
        let mut successor = self.ring.successor().await?;
        if successor.is_zero() {
            return Ok(());
        }

        if !matches!(self.rpc.ping(&successor.address).await, Ok(true)) {
            tracing::warn!("successor {} does not answer with a pong", successor.address);
            successor = self.first_live_successor(&me).await?;
            self.ring.set_successor(successor.clone()).await?;
            if successor.is_zero() {
                tracing::warn!("no live entry left in the successor list");
                return Ok(());
            }
            tracing::info!("adopted {} as successor", successor.address);
        }

        let fetched = self.rpc.get_successors(&successor.address).await?;
        self.ring.adopt_successors(fetched).await?;

        let pred_of_succ = self.rpc.get_predecessor(&successor.address).await?;
        if !pred_of_succ.is_zero() {
            if pred_of_succ.id == me.id {
                // already its predecessor
                return Ok(());
            }
            if pred_of_succ.id.in_range(me.id, successor.id) {
                tracing::info!(
                    "{} sits between us and {}, it becomes the successor",
                    pred_of_succ.address,
                    successor.address
                );
                self.ring.set_successor(pred_of_succ).await?;
            }
        }

        self.rpc.claim_predecessor(&successor.address, &me).await
    }

    async fn first_live_successor(&self, me: &NodeInfo) -> Result<NodeInfo> {
        for i in 1..SUCCESSOR_LIST_LEN {
            let candidate = self.ring.successor_entry(i).await?;
            if candidate.is_zero() || candidate.address == me.address {
                continue;
            }
            if matches!(self.rpc.ping(&candidate.address).await, Ok(true)) {
                return Ok(candidate);
            }
        }
        Ok(NodeInfo::zero())
    }

    /// Clear the predecessor unless it answers a ping with a pong.
    pub async fn check_predecessor(&self) -> Result<()> {
        let predecessor = self.ring.predecessor().await?;
        if predecessor.is_zero() {
            return Ok(());
        }

        match self.rpc.ping(&predecessor.address).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!("predecessor {} answered without a pong", predecessor.address);
                self.ring.set_predecessor(NodeInfo::zero()).await
            }
            Err(e) => {
                tracing::warn!("predecessor {} is gone: {}", predecessor.address, e);
                self.ring.set_predecessor(NodeInfo::zero()).await
            }
        }
    }

    /// Refresh finger `which` by looking up the owner of its target from the successor.
    /// Index 0 is the node itself and index 1 the successor, both are left alone.
    pub async fn fix(&self, which: usize) -> Result<()> {
        let successor = self.ring.successor().await?;
        if which == 0 || which == 1 || successor.is_zero() {
            return Ok(());
        }

        let me = self.ring.me();
        let target = me.id.target(which);
        let owner = lookup(self.rpc.as_ref(), target, &successor.address).await?;
        if owner == me.address {
            return Ok(());
        }

        let id = self.rpc.get_id(&owner).await?;
        if self
            .ring
            .set_finger(which, NodeInfo::with_id(id, &owner))
            .await?
        {
            tracing::trace!("finger {} is now {}", which, owner);
        }
        Ok(())
    }
}

mod stabilizer {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::FutureExt;
    use futures::pin_mut;
    use futures::select;
    use futures_timer::Delay;

    use super::*;

    impl Stabilizer {
        /// Run stabilization in a loop.
        pub async fn wait(self: Arc<Self>, interval: Duration) {
            loop {
                let timeout = Delay::new(interval).fuse();
                pin_mut!(timeout);
                select! {
                    _ = timeout => self
                        .stabilize()
                        .await
                        .unwrap_or_else(|e| tracing::error!("failed to stabilize {:?}", e)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::dht::Did;
    use crate::error::Error;

    /// Peers answering from a fixed script.
    #[derive(Default)]
    struct Script {
        alive: Mutex<HashSet<String>>,
        no_pong: Mutex<HashSet<String>>,
        successors: Mutex<HashMap<String, Vec<NodeInfo>>>,
        predecessors: Mutex<HashMap<String, NodeInfo>>,
        claims: Mutex<Vec<(String, NodeInfo)>>,
    }

    impl Script {
        fn up(&self, node: &NodeInfo) {
            self.alive.lock().unwrap().insert(node.address.clone());
        }

        fn check(&self, address: &str) -> Result<()> {
            if self.alive.lock().unwrap().contains(address) {
                Ok(())
            } else {
                Err(Error::unreachable(address, "down"))
            }
        }
    }

    #[async_trait]
    impl RingRpc for Script {
        async fn ping(&self, address: &str) -> Result<bool> {
            self.check(address)?;
            Ok(!self.no_pong.lock().unwrap().contains(address))
        }

        async fn get_id(&self, address: &str) -> Result<Did> {
            self.check(address)?;
            Ok(Did::digest(address))
        }

        async fn get_predecessor(&self, address: &str) -> Result<NodeInfo> {
            self.check(address)?;
            Ok(self
                .predecessors
                .lock()
                .unwrap()
                .get(address)
                .cloned()
                .unwrap_or_default())
        }

        async fn get_fingers(&self, address: &str) -> Result<Vec<NodeInfo>> {
            self.check(address)?;
            Ok(vec![NodeInfo::with_id(Did::digest(address), address)])
        }

        async fn get_successors(&self, address: &str) -> Result<Vec<NodeInfo>> {
            self.check(address)?;
            Ok(self
                .successors
                .lock()
                .unwrap()
                .get(address)
                .cloned()
                .unwrap_or_default())
        }

        async fn claim_predecessor(&self, address: &str, candidate: &NodeInfo) -> Result<()> {
            self.check(address)?;
            self.claims
                .lock()
                .unwrap()
                .push((address.to_string(), candidate.clone()));
            Ok(())
        }
    }

    fn node(id: u32, address: &str) -> NodeInfo {
        NodeInfo::with_id(Did::from(id), address)
    }

    #[tokio::test]
    async fn test_dead_successor_is_replaced_from_list() -> Result<()> {
        let me = node(10, "me");
        let (b, c, d) = (node(20, "b"), node(30, "c"), node(40, "d"));
        let script = Arc::new(Script::default());
        script.up(&c);
        script.up(&d);
        script
            .successors
            .lock()
            .unwrap()
            .insert("c".into(), vec![d.clone(), me.clone()]);

        let ring = RingHandle::spawn(me.clone());
        ring.set_successor(b.clone()).await?;
        ring.adopt_successors(vec![c.clone(), d.clone()]).await?;

        let stabilizer = Stabilizer::new(ring.clone(), script.clone());
        stabilizer.stabilize_successor().await?;

        assert_eq!(ring.successor().await?, c);
        let successors = ring.successors().await?;
        assert_eq!(&successors[..3], &[c.clone(), d, me.clone()]);
        assert_eq!(script.claims.lock().unwrap().as_slice(), &[("c".to_string(), me)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_successor_without_pong_is_replaced() -> Result<()> {
        let me = node(10, "me");
        let (b, c, d) = (node(20, "b"), node(30, "c"), node(40, "d"));
        let script = Arc::new(Script::default());
        for n in [&b, &c, &d] {
            script.up(n);
        }
        script.no_pong.lock().unwrap().insert("b".into());
        script.no_pong.lock().unwrap().insert("c".into());

        let ring = RingHandle::spawn(me.clone());
        ring.set_successor(b).await?;
        ring.adopt_successors(vec![c, d.clone()]).await?;

        Stabilizer::new(ring.clone(), script.clone())
            .stabilize_successor()
            .await?;
        assert_eq!(ring.successor().await?, d);
        assert_eq!(script.claims.lock().unwrap().as_slice(), &[("d".to_string(), me)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_closer_predecessor_of_successor_is_adopted() -> Result<()> {
        let me = node(10, "me");
        let (closer, succ) = (node(15, "closer"), node(30, "succ"));
        let script = Arc::new(Script::default());
        script.up(&succ);
        script.up(&closer);
        script
            .predecessors
            .lock()
            .unwrap()
            .insert("succ".into(), closer.clone());

        let ring = RingHandle::spawn(me.clone());
        ring.set_successor(succ.clone()).await?;
        let stabilizer = Stabilizer::new(ring.clone(), script.clone());
        stabilizer.stabilize_successor().await?;

        assert_eq!(ring.successor().await?, closer);
        // the claim still goes to the successor this pass started with
        assert_eq!(script.claims.lock().unwrap()[0].0, "succ");
        Ok(())
    }

    #[tokio::test]
    async fn test_no_claim_when_already_predecessor() -> Result<()> {
        let me = node(10, "me");
        let succ = node(30, "succ");
        let script = Arc::new(Script::default());
        script.up(&succ);
        script
            .predecessors
            .lock()
            .unwrap()
            .insert("succ".into(), me.clone());

        let ring = RingHandle::spawn(me);
        ring.set_successor(succ.clone()).await?;
        Stabilizer::new(ring.clone(), script.clone())
            .stabilize_successor()
            .await?;
        assert_eq!(ring.successor().await?, succ);
        assert!(script.claims.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_whole_list_dead_clears_successor() -> Result<()> {
        let me = node(10, "me");
        let script = Arc::new(Script::default());
        let ring = RingHandle::spawn(me.clone());
        ring.set_successor(node(20, "b")).await?;
        ring.adopt_successors(vec![node(30, "c"), me]).await?;

        Stabilizer::new(ring.clone(), script)
            .stabilize_successor()
            .await?;
        assert!(ring.successor().await?.is_zero());
        Ok(())
    }

    #[tokio::test]
    async fn test_check_predecessor() -> Result<()> {
        let me = node(10, "me");
        let pred = node(5, "pred");
        let script = Arc::new(Script::default());
        let ring = RingHandle::spawn(me);
        let stabilizer = Stabilizer::new(ring.clone(), script.clone());

        script.up(&pred);
        ring.set_predecessor(pred.clone()).await?;
        stabilizer.check_predecessor().await?;
        assert_eq!(ring.predecessor().await?, pred);

        script.no_pong.lock().unwrap().insert("pred".into());
        stabilizer.check_predecessor().await?;
        assert!(ring.predecessor().await?.is_zero());

        ring.set_predecessor(pred).await?;
        script.alive.lock().unwrap().clear();
        stabilizer.check_predecessor().await?;
        assert!(ring.predecessor().await?.is_zero());
        Ok(())
    }

    #[tokio::test]
    async fn test_fix_index_cycles() {
        let ring = RingHandle::spawn(node(10, "me"));
        let stabilizer = Stabilizer::new(ring, Arc::new(Script::default()));
        let seen: Vec<usize> = (0..260).map(|_| stabilizer.next_fix_index()).collect();
        assert_eq!(&seen[..3], &[0, 1, 2]);
        assert_eq!(seen[256], 256);
        assert_eq!(seen[257], 1);
        assert_eq!(seen[258], 2);
    }

    #[tokio::test]
    async fn test_fix_skips_self_and_low_indices() -> Result<()> {
        let me = node(10, "me");
        let succ = NodeInfo::new("succ");
        let script = Arc::new(Script::default());
        script.up(&succ);
        let ring = RingHandle::spawn(me);
        let stabilizer = Stabilizer::new(ring.clone(), script);

        // nothing to fix without a successor
        stabilizer.fix(5).await?;
        assert!(ring.finger(5).await?.is_zero());

        ring.set_successor(succ.clone()).await?;
        stabilizer.fix(1).await?;
        stabilizer.fix(5).await?;
        // the scripted successor stands alone, so it owns every target
        assert_eq!(ring.finger(5).await?, succ);
        // the same member is not installed twice
        stabilizer.fix(6).await?;
        assert!(ring.finger(6).await?.is_zero());
        Ok(())
    }
}
