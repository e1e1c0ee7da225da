use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::consts::RING_PROTOCOL_ID;
use crate::dht::Did;
use crate::dht::NodeInfo;
use crate::error::Error;
use crate::error::Result;
use crate::message::Envelope;
use crate::message::HandleMsg;
use crate::message::MessageHandler;

/// A protocol riding the ring listener next to ring maintenance.
#[async_trait]
pub trait Application: Send + Sync {
    /// Answer one request addressed to this application. `None` drops it.
    async fn on_message(&self, _payload: Bytes) -> Option<Bytes> {
        None
    }

    /// The local node accepted a new predecessor.
    async fn on_predecessor_changed(&self, _id: Did, _address: &str) {}
}

/// Protocol id to application mapping, fixed once the node starts.
#[derive(Default, Clone)]
pub struct AppRegistry {
    apps: HashMap<u32, Arc<dyn Application>>,
}

impl AppRegistry {
    /// Register `app` under `protocol_id`.
    pub fn register(&mut self, protocol_id: u32, app: Arc<dyn Application>) -> Result<()> {
        if protocol_id == RING_PROTOCOL_ID {
            return Err(Error::InvalidProtocolId(protocol_id));
        }
        if self.apps.contains_key(&protocol_id) {
            return Err(Error::ProtocolIdTaken(protocol_id));
        }
        self.apps.insert(protocol_id, app);
        Ok(())
    }

    /// Application registered under `protocol_id`.
    pub fn get(&self, protocol_id: u32) -> Option<Arc<dyn Application>> {
        self.apps.get(&protocol_id).cloned()
    }

    /// Number of registered applications.
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Tell every application about a new predecessor.
    pub async fn notify_predecessor_changed(&self, predecessor: &NodeInfo) {
        for app in self.apps.values() {
            app.on_predecessor_changed(predecessor.id, &predecessor.address)
                .await;
        }
    }
}

#[async_trait]
impl HandleMsg<Envelope> for MessageHandler {
    async fn handle(&self, msg: &Envelope) -> Result<Option<Envelope>> {
        let Some(app) = self.apps().get(msg.protocol_id) else {
            tracing::debug!("no application for protocol {}, dropped", msg.protocol_id);
            return Ok(None);
        };
        Ok(app
            .on_message(msg.payload.clone())
            .await
            .map(|reply| Envelope::new(msg.protocol_id, reply)))
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;
    use crate::dht::RingHandle;
    use crate::message::RingMessage;

    struct Echo;

    #[async_trait]
    impl Application for Echo {
        async fn on_message(&self, payload: Bytes) -> Option<Bytes> {
            Some(payload)
        }
    }

    #[derive(Default)]
    struct Watcher {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Application for Watcher {
        async fn on_predecessor_changed(&self, _id: Did, address: &str) {
            self.seen.lock().unwrap().push(address.to_string());
        }
    }

    #[test]
    fn test_register_rules() {
        let mut apps = AppRegistry::default();
        assert!(matches!(
            apps.register(RING_PROTOCOL_ID, Arc::new(Echo)),
            Err(Error::InvalidProtocolId(1))
        ));
        apps.register(2, Arc::new(Echo)).unwrap();
        assert!(matches!(
            apps.register(2, Arc::new(Echo)),
            Err(Error::ProtocolIdTaken(2))
        ));
        assert_eq!(apps.len(), 1);
    }

    #[tokio::test]
    async fn test_route_by_protocol_id() -> Result<()> {
        let mut apps = AppRegistry::default();
        apps.register(2, Arc::new(Echo))?;
        let handler = MessageHandler::new(RingHandle::spawn(NodeInfo::new("a:1")), Arc::new(apps));

        let frame = Envelope::new(2, Bytes::from_static(b"hello")).to_bincode()?;
        let reply = handler.handle_frame(&frame).await?.unwrap();
        assert_eq!(reply, Envelope::new(2, Bytes::from_static(b"hello")));

        let frame = Envelope::new(3, Bytes::from_static(b"hello")).to_bincode()?;
        assert!(handler.handle_frame(&frame).await?.is_none());

        let frame = Envelope::ring(&RingMessage::Ping)?.to_bincode()?;
        let reply = handler.handle_frame(&frame).await?.unwrap();
        assert_eq!(reply.ring_message()?, RingMessage::Pong);
        Ok(())
    }

    #[tokio::test]
    async fn test_accepted_claim_notifies_applications() -> Result<()> {
        let watcher = Arc::new(Watcher::default());
        let mut apps = AppRegistry::default();
        apps.register(2, watcher.clone())?;
        let handler = MessageHandler::new(RingHandle::spawn(NodeInfo::new("a:1")), Arc::new(apps));

        let claim = Envelope::ring(&RingMessage::ClaimPred(NodeInfo::new("b:1")))?.to_bincode()?;
        handler.handle_frame(&claim).await?;
        // a claim from the node itself is refused and not reported
        let own = Envelope::ring(&RingMessage::ClaimPred(NodeInfo::new("a:1")))?.to_bincode()?;
        handler.handle_frame(&own).await?;

        for _ in 0..50 {
            if !watcher.seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(watcher.seen.lock().unwrap().as_slice(), &["b:1".to_string()]);
        Ok(())
    }
}
