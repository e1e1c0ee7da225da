use async_trait::async_trait;

use crate::dht::NodeInfo;
use crate::error::Result;
use crate::message::types::RingMessage;
use crate::message::Envelope;
use crate::message::HandleMsg;
use crate::message::MessageHandler;

fn known(list: Vec<NodeInfo>) -> Vec<NodeInfo> {
    list.into_iter().filter(|n| !n.is_zero()).collect()
}

#[async_trait]
impl HandleMsg<RingMessage> for MessageHandler {
    async fn handle(&self, msg: &RingMessage) -> Result<Option<Envelope>> {
        let reply = match msg {
            RingMessage::Ping => RingMessage::Pong,
            RingMessage::GetId => RingMessage::SendId(self.ring.did()),
            RingMessage::GetPred => {
                let predecessor = self.ring.predecessor().await?;
                if predecessor.is_zero() {
                    return Ok(Some(Envelope::null()));
                }
                RingMessage::SendPred(predecessor)
            }
            RingMessage::ClaimPred(candidate) => {
                if self.ring.offer_predecessor(candidate.clone()).await? {
                    tracing::info!("{} is the new predecessor", candidate.address);
                    let apps = self.apps().clone();
                    let candidate = candidate.clone();
                    tokio::spawn(async move {
                        apps.notify_predecessor_changed(&candidate).await;
                    });
                }
                return Ok(Some(Envelope::null()));
            }
            RingMessage::GetFingers => RingMessage::SendFingers(known(self.ring.fingers().await?)),
            RingMessage::GetSucc => RingMessage::SendFingers(known(self.ring.successors().await?)),
            RingMessage::Pong
            | RingMessage::SendId(_)
            | RingMessage::SendPred(_)
            | RingMessage::SendFingers(_) => {
                tracing::debug!("unexpected {} request, dropped", msg.name());
                return Ok(None);
            }
        };
        Envelope::ring(&reply).map(Some)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::dht::Did;
    use crate::dht::RingHandle;
    use crate::message::AppRegistry;

    fn handler(address: &str) -> MessageHandler {
        MessageHandler::new(
            RingHandle::spawn(NodeInfo::new(address)),
            Arc::new(AppRegistry::default()),
        )
    }

    async fn ask(handler: &MessageHandler, msg: RingMessage) -> Option<RingMessage> {
        let reply = HandleMsg::<RingMessage>::handle(handler, &msg)
            .await
            .unwrap()
            .unwrap();
        if reply.is_null() {
            None
        } else {
            Some(reply.ring_message().unwrap())
        }
    }

    #[tokio::test]
    async fn test_ping_and_id() {
        let h = handler("127.0.0.1:3333");
        assert_eq!(ask(&h, RingMessage::Ping).await, Some(RingMessage::Pong));
        assert_eq!(
            ask(&h, RingMessage::GetId).await,
            Some(RingMessage::SendId(Did::digest("127.0.0.1:3333")))
        );
    }

    #[tokio::test]
    async fn test_claim_then_get_pred() {
        let h = handler("127.0.0.1:3333");
        assert_eq!(ask(&h, RingMessage::GetPred).await, None);

        let p = NodeInfo::new("127.0.0.2:3333");
        assert_eq!(ask(&h, RingMessage::ClaimPred(p.clone())).await, None);
        assert_eq!(ask(&h, RingMessage::GetPred).await, Some(RingMessage::SendPred(p.clone())));

        // a lone node also takes its first predecessor as successor
        let Some(RingMessage::SendFingers(succ)) = ask(&h, RingMessage::GetSucc).await else {
            panic!("expected a successor list");
        };
        assert_eq!(succ, vec![p.clone()]);
        let Some(RingMessage::SendFingers(fingers)) = ask(&h, RingMessage::GetFingers).await else {
            panic!("expected a finger table");
        };
        assert_eq!(fingers, vec![NodeInfo::new("127.0.0.1:3333"), p]);
    }

    #[tokio::test]
    async fn test_replies_are_not_requests() {
        let h = handler("127.0.0.1:3333");
        let reply = HandleMsg::<RingMessage>::handle(&h, &RingMessage::Pong)
            .await
            .unwrap();
        assert!(reply.is_none());
    }
}
