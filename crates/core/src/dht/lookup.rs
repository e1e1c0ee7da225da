//! Owner lookup over remote finger tables.
use async_recursion::async_recursion;

use super::types::NodeInfo;
use super::types::RingRpc;
use super::Did;
use crate::error::Error;
use crate::error::Result;

/// Find the address of the node owning `key`, starting the walk at `start`.
///
/// The finger table of `start` is fetched and scanned from the farthest finger down.
/// The first finger strictly between `start` and `key` is the closest known predecessor
/// of the key and the walk recurses from it; a finger that fails is skipped. When no
/// finger qualifies the owner is `start`'s successor. If that successor does not answer,
/// the first answering entry of `start`'s successor list is returned, and `start` itself
/// when none answers.
///
/// Only an unreachable `start` fails the call.
#[async_recursion]
pub async fn lookup(rpc: &dyn RingRpc, key: Did, start: &str) -> Result<String> {
    let fingers = match rpc.get_fingers(start).await {
        Ok(fingers) => fingers,
        Err(e) if e.is_unreachable() => return Err(e),
        Err(e) => return Err(Error::LookupFailed(format!("{}: {}", start, e))),
    };

    // a ring of one
    if fingers.len() < 2 {
        return Ok(start.to_string());
    }

    let current = &fingers[0];
    if key == current.id {
        return Ok(current.address.clone());
    }

    for finger in fingers[1..].iter().rev() {
        if finger.id.in_range(current.id, key) {
            match lookup(rpc, key, &finger.address).await {
                Ok(owner) => return Ok(owner),
                Err(e) => {
                    tracing::debug!("lookup skips finger {}: {}", finger.address, e);
                    continue;
                }
            }
        }
    }

    let successor = &fingers[1];
    if matches!(rpc.ping(&successor.address).await, Ok(true)) {
        return Ok(successor.address.clone());
    }

    tracing::warn!(
        "successor {} of {} is gone, probing its successor list",
        successor.address,
        current.address
    );
    Ok(first_live_successor(rpc, current, successor)
        .await
        .unwrap_or_else(|| current.address.clone()))
}

async fn first_live_successor(
    rpc: &dyn RingRpc,
    current: &NodeInfo,
    failed: &NodeInfo,
) -> Option<String> {
    let successors = rpc.get_successors(&current.address).await.ok()?;
    for candidate in successors.iter().filter(|s| s.address != failed.address) {
        if matches!(rpc.ping(&candidate.address).await, Ok(true)) {
            return Some(candidate.address.clone());
        }
    }
    None
}
