use std::time::Duration;

use tokio::time::sleep;

use crate::error::Result;
use crate::replica::Args;
use crate::replica::DELETE_MISSING;
use crate::replica::ENTRY_DELETED;
use crate::replica::ENTRY_NOT_FOUND;
use crate::replica::JOIN_DONE;
use crate::replica::KEY_NOT_FOUND;
use crate::replica::LEAVE_DONE;
use crate::replica::NO_SUCCESSOR;
use crate::replica::RECONCILIATION_STARTED;
use crate::replica::VALUE_APPENDED;
use crate::tests::default::expected_owner;
use crate::tests::default::host;
use crate::tests::default::prepare_node;
use crate::tests::default::prepare_ring;
use crate::tests::default::ring_converged;
use crate::tests::default::successor_of;
use crate::tests::default::wait_until;
use crate::tests::default::Node;

async fn holds(node: &Node, key: &str, value: &str) -> bool {
    matches!(
        node.replica.store().peek(key).await,
        Ok(Some(entry)) if entry.value == value
    )
}

async fn lacks(node: &Node, key: &str) -> bool {
    matches!(node.replica.store().peek(key).await, Ok(None))
}

#[tokio::test]
async fn test_lone_node_serves_its_own_keys() -> Result<()> {
    let node = prepare_node(&host(30, 0)).await;
    assert_eq!(node.replica.get(&Args::key("k")).await?, KEY_NOT_FOUND);
    assert_eq!(
        node.replica.put(&Args::key_value("k", "v")).await?,
        "Entry correctly inserted in the DB"
    );
    assert_eq!(node.replica.get(&Args::key("k")).await?, "Key   | k\nValue | v");
    assert_eq!(
        node.replica.start_reconciliation().await?,
        NO_SUCCESSOR
    );
    Ok(())
}

#[tokio::test]
async fn test_put_lands_on_owner_and_its_successor() -> Result<()> {
    let nodes = prepare_ring(31, 3).await;
    let reply = nodes[0]
        .replica
        .put(&Args::key_value("apple", "red"))
        .await?;
    assert_eq!(reply, "Entry correctly inserted in the DB");

    let owner = expected_owner(&nodes, "apple");
    assert!(holds(owner, "apple", "[red]").await);

    let replica = successor_of(&nodes, owner);
    wait_until("replica on successor", move || holds(replica, "apple", "[red]")).await;

    for node in nodes.iter() {
        assert_eq!(
            node.replica.get(&Args::key("apple")).await?,
            "Key   | apple\nValue | red"
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_second_put_and_append() -> Result<()> {
    let nodes = prepare_ring(32, 3).await;
    let client = &nodes[1].replica;

    client.put(&Args::key_value("k", "v1")).await?;
    assert_eq!(
        client.put(&Args::key_value("k", "v2")).await?,
        "Entry already exists. Correctly updated"
    );
    assert_eq!(
        client.append(&Args::key_value("k", "v3")).await?,
        VALUE_APPENDED
    );
    assert_eq!(
        client.append(&Args::key_value("missing", "x")).await?,
        ENTRY_NOT_FOUND
    );

    let owner = expected_owner(&nodes, "k");
    assert!(holds(owner, "k", "[v2,v3]").await);
    let replica = successor_of(&nodes, owner);
    wait_until("appended replica", move || holds(replica, "k", "[v2,v3]")).await;
    Ok(())
}

#[tokio::test]
async fn test_get_of_unknown_key_asks_the_owner() -> Result<()> {
    let nodes = prepare_ring(33, 3).await;
    for node in nodes.iter() {
        assert_eq!(node.replica.get(&Args::key("nothing")).await?, ENTRY_NOT_FOUND);
    }
    Ok(())
}

#[tokio::test]
async fn test_delete_walks_the_whole_ring() -> Result<()> {
    let nodes = prepare_ring(34, 5).await;
    nodes[0].replica.put(&Args::key_value("doomed", "x")).await?;

    let owner = expected_owner(&nodes, "doomed");
    let replica = successor_of(&nodes, owner);
    wait_until("replica before delete", move || holds(replica, "doomed", "[x]")).await;

    assert_eq!(
        nodes[3].replica.delete(&Args::key("doomed")).await?,
        ENTRY_DELETED
    );

    let ring = &nodes[..];
    wait_until("delete on every node", move || async move {
        for node in ring.iter() {
            if !lacks(node, "doomed").await {
                return false;
            }
        }
        true
    })
    .await;

    assert_eq!(
        nodes[2].replica.delete(&Args::key("doomed")).await?,
        DELETE_MISSING
    );
    Ok(())
}

#[tokio::test]
async fn test_forward_delete_reports_when_back_at_owner() -> Result<()> {
    let nodes = prepare_ring(35, 3).await;
    let owner = expected_owner(&nodes, "gone");
    let args = Args {
        handler: owner.address().to_string(),
        deleted: false,
        ..Args::key("gone")
    };
    assert_eq!(
        owner.replica.forward_delete(args.clone()).await?,
        "Entry to delete not found"
    );
    let args = Args {
        deleted: true,
        ..args
    };
    assert_eq!(
        owner.replica.forward_delete(args).await?,
        "Entry succesfully deleted"
    );
    Ok(())
}

#[tokio::test]
async fn test_join_hands_entries_to_the_new_node() -> Result<()> {
    let old = prepare_node(&host(36, 0)).await;
    for i in 0..5 {
        old.replica
            .put(&Args::key_value(&format!("key{}", i), "v"))
            .await?;
    }

    let new = prepare_node(&host(36, 1)).await;
    new.swarm.join(old.address()).await?;
    let nodes = [old, new];
    let ring = &nodes[..];
    wait_until("two node ring", move || ring_converged(ring)).await;

    let new = &nodes[1];
    let pred = new.replica.wait_for_predecessor().await?;
    assert_eq!(pred.address, nodes[0].address());
    assert_eq!(nodes[0].replica.join(new.address()).await?, JOIN_DONE);

    wait_until("migrated entries", move || async move {
        matches!(new.replica.store().count().await, Ok(5))
    })
    .await;
    Ok(())
}

#[tokio::test]
async fn test_leave_hands_entries_to_the_successor() -> Result<()> {
    let nodes = prepare_ring(37, 3).await;
    let leaving = &nodes[0];
    for i in 0..4 {
        leaving
            .replica
            .store()
            .put(&format!("local{}", i), "v")
            .await?;
    }

    assert_eq!(leaving.replica.leave().await?, LEAVE_DONE);

    let heir = successor_of(&nodes, leaving);
    wait_until("entries handed over", move || async move {
        for i in 0..4 {
            if !holds(heir, &format!("local{}", i), "[v]").await {
                return false;
            }
        }
        true
    })
    .await;
    Ok(())
}

#[tokio::test]
async fn test_reconciliation_spreads_the_latest_write() -> Result<()> {
    let nodes = prepare_ring(38, 3).await;
    for node in nodes.iter() {
        node.replica.store().put("shared", "old").await?;
    }
    sleep(Duration::from_millis(20)).await;
    nodes[2].replica.store().put("shared", "new").await?;
    nodes[1].replica.store().put("private", "mine").await?;

    assert_eq!(
        nodes[0].replica.start_reconciliation().await?,
        RECONCILIATION_STARTED
    );

    let ring = &nodes[..];
    wait_until("reconciled value", move || async move {
        for node in ring.iter() {
            if !holds(node, "shared", "[new]").await {
                return false;
            }
        }
        true
    })
    .await;

    let handler = &nodes[0];
    wait_until("walk finished", move || async move {
        handler.replica.recon_state().await == Default::default()
    })
    .await;

    // keys only one node knows are not spread by reconciliation
    assert!(holds(&nodes[1], "private", "[mine]").await);
    assert!(lacks(&nodes[0], "private").await);
    assert!(lacks(&nodes[2], "private").await);
    Ok(())
}
