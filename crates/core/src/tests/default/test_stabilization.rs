use crate::error::Result;
use crate::inspect::RingInspect;
use crate::tests::default::host;
use crate::tests::default::prepare_node;
use crate::tests::default::prepare_ring;
use crate::tests::default::ring_converged;
use crate::tests::default::successor_of;
use crate::tests::default::wait_until;

#[tokio::test]
async fn test_two_nodes_point_at_each_other() -> Result<()> {
    let node1 = prepare_node(&host(20, 0)).await;
    let node2 = prepare_node(&host(20, 1)).await;
    node2.swarm.join(node1.address()).await?;

    let nodes = [node1, node2];
    let ring = &nodes[..];
    wait_until("two node ring", move || ring_converged(ring)).await;

    let state = nodes[0].swarm.ring().snapshot().await?;
    assert_eq!(state.successor().address, nodes[1].address());
    assert_eq!(state.successors.get(0), state.finger.get(1));
    Ok(())
}

#[tokio::test]
async fn test_successor_lists_fill_up() -> Result<()> {
    let nodes = prepare_ring(21, 4).await;
    let first = &nodes[0];
    let expected: Vec<String> = {
        let mut chain = vec![];
        let mut cursor = successor_of(&nodes, first);
        while cursor.address() != first.address() {
            chain.push(cursor.address().to_string());
            cursor = successor_of(&nodes, cursor);
        }
        chain
    };

    wait_until("successor list", move || {
        let expected = expected.clone();
        async move {
            let Ok(state) = first.swarm.ring().snapshot().await else {
                return false;
            };
            let inspect = RingInspect::inspect(&state);
            inspect.successors.starts_with(&expected)
        }
    })
    .await;
    Ok(())
}

#[tokio::test]
async fn test_crashed_node_is_routed_around() -> Result<()> {
    let mut nodes = prepare_ring(22, 4).await;
    let victim = nodes.remove(2);
    let victim_address = victim.address().to_string();
    drop(victim);

    let ring = &nodes[..];
    wait_until("ring repair", move || ring_converged(ring)).await;

    for node in nodes.iter() {
        let state = node.swarm.ring().snapshot().await?;
        assert_ne!(state.successor().address, victim_address);
        assert_ne!(state.predecessor.address, victim_address);
    }
    Ok(())
}

#[tokio::test]
async fn test_survivor_of_two_becomes_lone() -> Result<()> {
    let mut nodes = prepare_ring(23, 2).await;
    drop(nodes.pop());
    let survivor = &nodes[0];

    wait_until("lone survivor", move || async move {
        let Ok(state) = survivor.swarm.ring().snapshot().await else {
            return false;
        };
        state.successor().is_zero() && state.predecessor.is_zero()
    })
    .await;
    assert_eq!(survivor.swarm.lookup_key("k").await?, survivor.address());
    Ok(())
}
