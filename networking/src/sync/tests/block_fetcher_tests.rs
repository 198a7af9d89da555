use chain::{Chain, MemoryChain, SyncConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::common::{
    EthBehaviour, MockEth, build_chain, child_with_tx, eth_peer, genesis, shared_peers,
    test_config,
};
use crate::sync::block_fetcher::range_tasks;
use crate::sync::{BlockFetcher, BlockTask, FetchOutcome, Fetcher};

fn sync_config(max_per_request: u64) -> SyncConfig {
    SyncConfig {
        max_per_request,
        ..SyncConfig::default()
    }
}

#[rstest]
#[case(1, 25, 10, false)]
#[case(5, 10, 10, false)]
#[case(1, 7, 3, false)]
#[case(100, 31, 8, true)]
#[case(10, 10, 4, true)]
fn test_range_tasks_partition_the_range(
    #[case] first: u64,
    #[case] count: u64,
    #[case] max: u64,
    #[case] reverse: bool,
) {
    let tasks = range_tasks(first, count, max, reverse);

    assert!(tasks.iter().all(|task| task.count > 0 && task.count <= max));
    assert_eq!(tasks.iter().map(|task| task.count).sum::<u64>(), count);
    assert_eq!(tasks[0].first, first);
    for pair in tasks.windows(2) {
        let expected = if reverse {
            pair[0].first - pair[0].count
        } else {
            pair[0].first + pair[0].count
        };
        assert_eq!(pair[1].first, expected);
    }
}

#[test]
fn test_range_tasks_examples() {
    assert_eq!(
        range_tasks(1, 25, 10, false),
        vec![
            BlockTask { first: 1, count: 10 },
            BlockTask { first: 11, count: 10 },
            BlockTask { first: 21, count: 5 },
        ]
    );
    assert_eq!(
        range_tasks(29, 12, 8, true),
        vec![
            BlockTask { first: 29, count: 8 },
            BlockTask { first: 21, count: 4 },
        ]
    );
    assert!(range_tasks(1, 0, 10, false).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_block_fetcher_fills_chain() {
    let blocks = build_chain(24, 1);
    let chain = Arc::new(MemoryChain::new(genesis()));
    let peers = shared_peers(vec![
        eth_peer(Arc::new(MockEth::new(blocks.clone(), EthBehaviour::Serve(usize::MAX)))),
        eth_peer(Arc::new(MockEth::new(blocks.clone(), EthBehaviour::Serve(usize::MAX)))),
    ]);
    let handler = BlockFetcher::new(chain.clone(), 1, 24, &sync_config(10));
    let mut fetcher = Fetcher::new(handler, peers, test_config());

    let outcome = fetcher.fetch().await.unwrap();

    assert_eq!(outcome, FetchOutcome::Completed);
    assert_eq!(fetcher.processed(), 3);
    assert_eq!(chain.height().await, 24);
    assert_eq!(
        chain.get_block(24).await.unwrap().map(|block| block.hash()),
        Some(blocks[24].hash())
    );
}

#[tokio::test(start_paused = true)]
async fn test_short_responses_are_completed_from_partial_results() {
    let blocks = build_chain(10, 1);
    let chain = Arc::new(MemoryChain::new(genesis()));
    let eth = Arc::new(MockEth::new(blocks.clone(), EthBehaviour::Serve(3)));
    let peers = shared_peers(vec![eth_peer(eth.clone())]);
    let handler = BlockFetcher::new(chain.clone(), 1, 10, &sync_config(10));
    let mut fetcher = Fetcher::new(handler, peers, test_config());

    fetcher.fetch().await.unwrap();

    assert_eq!(chain.height().await, 10);
    assert_eq!(fetcher.processed(), 1);
    assert_eq!(eth.header_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_bodies_are_fetched_for_blocks_with_transactions() {
    let mut blocks = vec![genesis()];
    for i in 0..5u8 {
        let parent = blocks[blocks.len() - 1].clone();
        blocks.push(child_with_tx(&parent, &[0xf8, i]));
    }
    let chain = Arc::new(MemoryChain::new(genesis()));
    let peers = shared_peers(vec![eth_peer(Arc::new(MockEth::new(
        blocks.clone(),
        EthBehaviour::Serve(usize::MAX),
    )))]);
    let handler = BlockFetcher::new(chain.clone(), 1, 5, &sync_config(10));
    let mut fetcher = Fetcher::new(handler, peers, test_config());

    fetcher.fetch().await.unwrap();

    let head = chain.get_block(5).await.unwrap().unwrap();
    assert_eq!(head.hash(), blocks[5].hash());
    assert_eq!(head.transactions, blocks[5].transactions);
}

#[tokio::test(start_paused = true)]
async fn test_forged_bodies_ban_peer_and_leave_chain_untouched() {
    let mut blocks = vec![genesis()];
    for i in 0..3u8 {
        let parent = blocks[blocks.len() - 1].clone();
        blocks.push(child_with_tx(&parent, &[0xf8, i]));
    }
    let chain = Arc::new(MemoryChain::new(genesis()));
    let bad = eth_peer(Arc::new(MockEth::new(blocks.clone(), EthBehaviour::BadBodies)));
    let bad_id = bad.peer_id;
    let peers = shared_peers(vec![bad]);
    let handler = BlockFetcher::new(chain.clone(), 1, 3, &sync_config(10));
    let mut fetcher = Fetcher::new(handler, peers.clone(), test_config());

    let stalled = tokio::time::timeout(Duration::from_secs(5), fetcher.fetch()).await;

    assert!(stalled.is_err());
    assert_eq!(chain.height().await, 0);
    assert!(peers.lock().is_banned(&bad_id));

    peers.lock().add_peer(eth_peer(Arc::new(MockEth::new(
        blocks.clone(),
        EthBehaviour::Serve(usize::MAX),
    ))));
    fetcher.fetch().await.unwrap();
    assert_eq!(chain.height().await, 3);
}

#[tokio::test(start_paused = true)]
async fn test_failing_peer_is_banned_and_job_moves_on() {
    let blocks = build_chain(5, 1);
    let chain = Arc::new(MemoryChain::new(genesis()));
    let failing = eth_peer(Arc::new(MockEth::new(blocks.clone(), EthBehaviour::Fail)));
    let failing_id = failing.peer_id;
    let peers = shared_peers(vec![failing]);
    let handler = BlockFetcher::new(chain.clone(), 1, 5, &sync_config(10));
    let mut fetcher = Fetcher::new(handler, peers.clone(), test_config());

    assert!(
        tokio::time::timeout(Duration::from_secs(2), fetcher.fetch())
            .await
            .is_err()
    );
    assert!(peers.lock().is_banned(&failing_id));

    peers.lock().add_peer(eth_peer(Arc::new(MockEth::new(
        blocks,
        EthBehaviour::Serve(usize::MAX),
    ))));
    fetcher.fetch().await.unwrap();
    assert_eq!(chain.height().await, 5);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_parent_steps_back_onto_the_fork() {
    let local = build_chain(5, 1);
    let remote = build_chain(10, 2);
    let chain = Arc::new(MemoryChain::new(genesis()));
    chain.put_blocks(local[1..].to_vec()).await.unwrap();
    assert_eq!(chain.height().await, 5);

    let peers = shared_peers(vec![
        eth_peer(Arc::new(MockEth::new(remote.clone(), EthBehaviour::Serve(usize::MAX)))),
        eth_peer(Arc::new(MockEth::new(remote.clone(), EthBehaviour::Serve(usize::MAX)))),
    ]);
    let handler = BlockFetcher::new(chain.clone(), 6, 5, &sync_config(10));
    let mut fetcher = Fetcher::new(handler, peers.clone(), test_config());

    let outcome = fetcher.fetch().await.unwrap();

    assert_eq!(outcome, FetchOutcome::Completed);
    assert_eq!(chain.height().await, 10);
    for number in [1, 5, 10] {
        assert_eq!(
            chain.get_block(number).await.unwrap().map(|block| block.hash()),
            Some(remote[number as usize].hash())
        );
    }
    let banned = {
        let peers = peers.lock();
        peers
            .get_all_peers()
            .filter(|peer| peers.is_banned(&peer.peer_id))
            .count()
    };
    assert_eq!(banned, 1);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_peer_expires() {
    let blocks = build_chain(2, 1);
    let chain = Arc::new(MemoryChain::new(genesis()));
    let hanging = eth_peer(Arc::new(MockEth::new(blocks.clone(), EthBehaviour::Hang)));
    let hanging_id = hanging.peer_id;
    let peers = shared_peers(vec![
        hanging,
        eth_peer(Arc::new(MockEth::new(blocks, EthBehaviour::Empty))),
    ]);
    let handler = BlockFetcher::new(chain.clone(), 1, 2, &sync_config(10));
    let mut fetcher = Fetcher::new(handler, peers.clone(), test_config());

    assert!(
        tokio::time::timeout(Duration::from_secs(3), fetcher.fetch())
            .await
            .is_err()
    );
    assert!(peers.lock().is_banned(&hanging_id));
    assert_eq!(chain.height().await, 0);
}
