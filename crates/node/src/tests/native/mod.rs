use std::sync::Arc;
use std::time::Duration;

use chordkv_core::replica::Args;
use tokio::time::sleep;
use tokio::time::Instant;

use crate::native::config::Config;
use crate::native::config::PortsConfig;
use crate::native::endpoint::run_node_api;
use crate::processor::Processor;
use crate::processor::ProcessorBuilder;

pub fn test_config(host: &str) -> Config {
    Config {
        bind_host: host.to_string(),
        ports: PortsConfig {
            ring: 0,
            rpc: 18180,
            ..Default::default()
        },
        stabilize_interval: 1,
        wait_successor_interval: 1,
        ..Default::default()
    }
}

pub async fn prepare_processor(host: &str) -> Processor {
    ProcessorBuilder::from_config(&test_config(host))
        .build()
        .await
        .unwrap()
}

async fn serve_processor(host: &str) -> (Arc<Processor>, tokio::task::JoinHandle<()>) {
    let config = test_config(host);
    let processor = Arc::new(ProcessorBuilder::from_config(&config).build().await.unwrap());
    let addr = format!("{}:{}", host, config.ports.rpc);
    let p = processor.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = run_node_api(&addr, p).await {
            tracing::error!("endpoint stopped: {}", e);
        }
    });
    (processor, server)
}

#[tokio::test]
async fn test_join_receives_predecessor_entries() {
    let (first, first_server) = serve_processor("127.0.61.1").await;
    let (second, second_server) = serve_processor("127.0.61.2").await;

    for i in 0..8 {
        first
            .put(&Args::key_value(&format!("key{}", i), "v"))
            .await
            .unwrap();
    }

    second
        .enter_ring(Some(first.me().address.as_str()))
        .await
        .unwrap();

    // The join reply comes back once the migration is sent; merging is asynchronous.
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        if second.replica().store().count().await.unwrap() == 8 {
            break;
        }
        assert!(Instant::now() < deadline, "migration never arrived");
        sleep(Duration::from_millis(100)).await;
    }

    first_server.abort();
    second_server.abort();
}
