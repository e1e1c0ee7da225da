use crate::error::Result;
use crate::tests::default::expected_owner;
use crate::tests::default::host;
use crate::tests::default::prepare_node;
use crate::tests::default::prepare_ring;

#[tokio::test]
async fn test_lone_node_owns_every_key() -> Result<()> {
    let node = prepare_node(&host(10, 0)).await;
    for key in ["a", "b", "zzz"] {
        assert_eq!(node.swarm.lookup_key(key).await?, node.address());
    }
    Ok(())
}

#[tokio::test]
async fn test_every_node_agrees_on_the_owner() -> Result<()> {
    let nodes = prepare_ring(11, 4).await;
    for key in ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"] {
        let owner = expected_owner(&nodes, key);
        for node in nodes.iter() {
            assert_eq!(
                node.swarm.lookup_key(key).await?,
                owner.address(),
                "{} resolved {} to the wrong owner",
                node.address(),
                key
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_lookup_of_a_node_id_returns_that_node() -> Result<()> {
    let nodes = prepare_ring(12, 3).await;
    for target in nodes.iter() {
        for node in nodes.iter() {
            assert_eq!(
                node.swarm.lookup(target.did(), node.address()).await?,
                target.address()
            );
        }
    }
    Ok(())
}
