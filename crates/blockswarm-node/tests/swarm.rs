//! Three peers and a tracker on loopback exchange a file end to end.

use blockswarm_core::{PeerIdentity, SwarmConfig};
use blockswarm_node::{tracker_server, NodeConfig, PeerNode};
use blockswarm_storage::{split_file, BlockStore};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;

fn fast_swarm(tracker: std::net::SocketAddr) -> SwarmConfig {
    SwarmConfig {
        block_size: 64,
        unchoke_interval_ms: 100,
        tracker_addr: tracker,
        tracker_update_interval_ms: 100,
        request_timeout_ms: 1_000,
        tracker_request_timeout_ms: 1_000,
        idle_backoff_ms: 50,
        retry_backoff_min_ms: 10,
        retry_backoff_max_ms: 30,
        ..Default::default()
    }
}

async fn seed_peer_blocks(source: &BlockStore, dir: &Path, blocks: &[u32]) {
    let store = BlockStore::open(dir).await.unwrap();
    for &block in blocks {
        let data = source.read_block(block).await.unwrap();
        store.write_block(block, &data).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_peers_converge() {
    let root = TempDir::new().unwrap();

    // 6 blocks, the last one short
    let content: Vec<u8> = (0..(64 * 5 + 20)).map(|i| (i % 251) as u8).collect();
    let input = root.path().join("input.bin");
    tokio::fs::write(&input, &content).await.unwrap();
    let source = BlockStore::open(root.path().join("source")).await.unwrap();
    let total_blocks = split_file(&input, &source, 64).await.unwrap();
    assert_eq!(total_blocks, 6);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tracker_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let tracker_addr = tracker_listener.local_addr().unwrap();
    let swarm = fast_swarm(tracker_addr);
    let tracker = tracker_server(&swarm);
    let tracker_rx = shutdown_rx.clone();
    let tracker_handle = tokio::spawn(async move { tracker.run(tracker_listener, tracker_rx).await });

    // Initial holdings union to the full range
    let holdings: [&[u32]; 3] = [&[0, 1, 2], &[3, 4], &[5, 0]];
    let mut states = Vec::new();
    let mut outputs = Vec::new();
    let mut handles = Vec::new();

    for (id, blocks) in holdings.iter().enumerate() {
        let peer_dir = root.path().join(format!("peer_{}", id));
        let mut config = NodeConfig::default();
        config.swarm = swarm.clone();
        config.storage.blocks_dir = peer_dir.join("blocks");
        config.storage.output_dir = peer_dir.join("downloads");
        config.logging.file = false;
        seed_peer_blocks(&source, &config.storage.blocks_dir, blocks).await;

        let id = id as u16;
        outputs.push(config.output_path(id));

        let identity = PeerIdentity::new(id, total_blocks, blocks.iter().copied()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let node = PeerNode::with_listener(config, identity, listener).await.unwrap();
        states.push(node.state());

        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { node.run(rx).await }));
    }

    let converged = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let complete = states.iter().all(|s| s.is_complete());
            let mut written = true;
            for output in &outputs {
                let len = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
                written &= len == content.len() as u64;
            }
            if complete && written {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(converged.is_ok(), "swarm did not converge");

    for output in &outputs {
        let bytes = tokio::fs::read(output).await.unwrap();
        assert_eq!(bytes, content, "output {} differs", output.display());
    }

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    tracker_handle.await.unwrap();
}
