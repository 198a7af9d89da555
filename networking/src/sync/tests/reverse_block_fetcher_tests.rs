use chain::{Chain, MemoryChain, MemoryDb, SyncConfig};
use containers::Subchain;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use super::common::{EthBehaviour, MockEth, build_chain, eth_peer, genesis, shared_peers, test_config};
use crate::sync::{
    FetchOutcome, Fetcher, FetcherConfig, ReverseBlockFetcher, Skeleton, backfill_skeleton,
};

fn open(chain: &Arc<MemoryChain>) -> Arc<Skeleton> {
    Skeleton::open(
        &SyncConfig::default(),
        chain.clone(),
        Arc::new(MemoryDb::new()),
        None,
    )
    .unwrap()
}

fn config() -> FetcherConfig {
    FetcherConfig {
        max_per_request: 8,
        ..test_config()
    }
}

async fn wait_for_height(chain: &MemoryChain, height: u64) {
    for _ in 0..1_000 {
        if chain.height().await == height {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("chain never reached height {height}");
}

#[tokio::test(start_paused = true)]
async fn test_backfill_links_skeleton_and_fills_chain() {
    let blocks = build_chain(30, 1);
    let chain = Arc::new(MemoryChain::new(genesis()));
    let skeleton = open(&chain);
    skeleton
        .set_head(blocks[30].clone(), true, false, false)
        .await
        .unwrap();
    let peers = shared_peers(vec![
        eth_peer(Arc::new(MockEth::new(blocks.clone(), EthBehaviour::Serve(usize::MAX)))),
        eth_peer(Arc::new(MockEth::new(blocks.clone(), EthBehaviour::Serve(5)))),
    ]);

    backfill_skeleton(skeleton.clone(), peers, config())
        .await
        .unwrap();

    assert!(skeleton.is_linked().await);
    wait_for_height(&chain, 30).await;
    assert_eq!(
        chain.get_block(30).await.unwrap().map(|block| block.hash()),
        Some(blocks[30].hash())
    );
}

#[tokio::test(start_paused = true)]
async fn test_reverse_fetcher_walks_down_to_the_gap() {
    let blocks = build_chain(40, 1);
    let chain = Arc::new(MemoryChain::new(genesis()));
    let skeleton = open(&chain);
    skeleton
        .set_head(blocks[40].clone(), true, false, false)
        .await
        .unwrap();
    let peers = shared_peers(vec![eth_peer(Arc::new(MockEth::new(
        blocks.clone(),
        EthBehaviour::Serve(usize::MAX),
    )))]);
    // Only part of the gap, so the skeleton stays unlinked.
    let handler = ReverseBlockFetcher::new(skeleton.clone(), 39, 19, 40, 8);
    let mut fetcher = Fetcher::new(handler, peers, config());

    let outcome = fetcher.fetch().await.unwrap();

    assert_eq!(outcome, FetchOutcome::Completed);
    assert_eq!(fetcher.processed(), 3);
    assert_eq!(
        skeleton.status().await.subchains,
        vec![Subchain::new(40, 21, blocks[20].hash())]
    );
    assert!(!skeleton.is_linked().await);
    assert_eq!(skeleton.backfill_range().await, Some((20, 20)));
}

#[tokio::test(start_paused = true)]
async fn test_reverse_fetcher_halts_when_head_moves() {
    let blocks = build_chain(41, 1);
    let chain = Arc::new(MemoryChain::new(genesis()));
    let skeleton = open(&chain);
    skeleton
        .set_head(blocks[40].clone(), true, false, false)
        .await
        .unwrap();
    let handler = ReverseBlockFetcher::from_skeleton(skeleton.clone(), 8)
        .await
        .unwrap();
    skeleton
        .set_head(blocks[41].clone(), true, false, false)
        .await
        .unwrap();
    let peers = shared_peers(vec![eth_peer(Arc::new(MockEth::new(
        blocks.clone(),
        EthBehaviour::Serve(usize::MAX),
    )))]);
    let mut fetcher = Fetcher::new(handler, peers, config());

    let outcome = fetcher.fetch().await.unwrap();

    assert_eq!(outcome, FetchOutcome::Halted);
    assert_eq!(
        skeleton.status().await.subchains,
        vec![Subchain::new(41, 40, blocks[39].hash())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_peer_serving_another_chain_is_banned() {
    let blocks = build_chain(20, 1);
    let fork = build_chain(20, 2);
    let chain = Arc::new(MemoryChain::new(genesis()));
    let skeleton = open(&chain);
    skeleton
        .set_head(blocks[20].clone(), true, false, false)
        .await
        .unwrap();
    let liar = eth_peer(Arc::new(MockEth::new(fork, EthBehaviour::Serve(usize::MAX))));
    let liar_id = liar.peer_id;
    let peers = shared_peers(vec![liar]);

    let stalled = tokio::time::timeout(
        Duration::from_secs(5),
        backfill_skeleton(skeleton.clone(), peers.clone(), config()),
    )
    .await;

    assert!(stalled.is_err());
    assert!(peers.lock().is_banned(&liar_id));
    assert_eq!(
        skeleton.status().await.subchains,
        vec![Subchain::new(20, 20, blocks[19].hash())]
    );

    peers.lock().add_peer(eth_peer(Arc::new(MockEth::new(
        blocks.clone(),
        EthBehaviour::Serve(usize::MAX),
    ))));
    backfill_skeleton(skeleton.clone(), peers, config())
        .await
        .unwrap();
    assert!(skeleton.is_linked().await);
}

#[tokio::test(start_paused = true)]
async fn test_backfill_on_linked_skeleton_is_a_no_op() {
    let blocks = build_chain(1, 1);
    let chain = Arc::new(MemoryChain::new(genesis()));
    let skeleton = open(&chain);
    skeleton
        .set_head(blocks[1].clone(), true, false, false)
        .await
        .unwrap();
    assert!(skeleton.is_linked().await);

    backfill_skeleton(skeleton.clone(), shared_peers(Vec::new()), config())
        .await
        .unwrap();

    assert!(ReverseBlockFetcher::from_skeleton(skeleton, 8).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_backfill_walks_through_subchain_of_another_fork() {
    let blocks = build_chain(10, 1);
    let fork = build_chain(5, 2);
    let chain = Arc::new(MemoryChain::new(genesis()));
    let skeleton = open(&chain);
    skeleton
        .set_head(fork[5].clone(), true, false, false)
        .await
        .unwrap();
    skeleton
        .set_head(blocks[10].clone(), true, false, false)
        .await
        .unwrap();
    assert_eq!(
        skeleton.status().await.subchains,
        vec![
            Subchain::new(10, 10, blocks[9].hash()),
            Subchain::new(5, 5, fork[4].hash()),
        ]
    );
    assert_eq!(skeleton.backfill_range().await, Some((9, 9)));
    let peers = shared_peers(vec![eth_peer(Arc::new(MockEth::new(
        blocks.clone(),
        EthBehaviour::Serve(usize::MAX),
    )))]);

    backfill_skeleton(skeleton.clone(), peers, config())
        .await
        .unwrap();

    assert!(skeleton.is_linked().await);
    wait_for_height(&chain, 10).await;
    assert_eq!(
        chain.get_block(5).await.unwrap().map(|block| block.hash()),
        Some(blocks[5].hash())
    );
}
