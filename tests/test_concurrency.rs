// tests/test_concurrency.rs
//
// Many readers racing on one partition: no content is handed out twice and
// every reader is eventually served.

mod common;

use anyhow::Result;
use common::{content_for, dataset, names, MockBackend};
use futures::future::join_all;
use epochcache::{EpochTable, FileId, PartitionId, PassOptions};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cached_ids_are_consumed_exactly_once() -> Result<()> {
    const N: usize = 64;
    const M: usize = 16;

    let backend = Arc::new(MockBackend::with_delay(Duration::from_millis(2)));
    let table = Arc::new(EpochTable::new(1, backend.clone(), PassOptions::default()));
    table.init(dataset(N, N as u32))?;
    let all = names(N);

    for i in (0..N).step_by(N / M) {
        assert!(table.land_in_cache(FileId(i as u32), content_for(&all[i])).await?);
    }
    assert_eq!(table.partition_stats(PartitionId(0))?.cached, M);

    let mut handles = Vec::with_capacity(N);
    for name in all.iter().cloned() {
        let table = Arc::clone(&table);
        handles.push(tokio::spawn(async move { table.get(&name).await }));
    }

    let mut delivered = HashSet::new();
    for joined in join_all(handles).await {
        assert!(delivered.insert(joined??), "content delivered twice");
    }
    assert_eq!(delivered.len(), N);

    let stats = table.stats()?;
    assert_eq!(stats.cache_hits, M as u64);
    assert_eq!(stats.direct_fetches, (N - M) as u64);
    assert_eq!(backend.fetches(), N - M);
    assert!(table.is_complete());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_and_producers_race() -> Result<()> {
    const N: usize = 48;

    let backend = Arc::new(MockBackend::new());
    let table = Arc::new(EpochTable::new(7, backend.clone(), PassOptions::default().seed(5)));
    table.init(dataset(N, 16))?;
    let all = Arc::new(names(N));

    // Producers claim half of each partition up front so readers have to wait
    // or substitute while the landings trickle in.
    let mut claimed = Vec::new();
    for p in 0..3 {
        for _ in 0..8 {
            if let Some(file) = table.claim_prefetch(PartitionId(p))? {
                claimed.push(file);
            }
        }
    }
    assert_eq!(claimed.len(), 24);

    let mut producers = Vec::new();
    for (i, file) in claimed.into_iter().enumerate() {
        let table = Arc::clone(&table);
        let all = Arc::clone(&all);
        producers.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis((i % 5) as u64)).await;
            if i % 6 == 0 {
                // Some producers give up and hand the file back.
                table.register_unread(file)
            } else {
                table.land_in_cache(file, content_for(&all[file.0 as usize])).await
            }
        }));
    }

    let mut readers = Vec::new();
    for name in all.iter().cloned() {
        let table = Arc::clone(&table);
        readers.push(tokio::spawn(async move { table.get(&name).await }));
    }

    for producer in producers {
        producer.await??;
    }
    let mut delivered = HashSet::new();
    for reader in readers {
        assert!(delivered.insert(reader.await??));
    }
    assert_eq!(delivered.len(), N);

    let stats = table.stats()?;
    assert_eq!(stats.requested, N as u64);
    assert_eq!(stats.consumed, N as u64);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.cache_hits + stats.direct_fetches, N as u64);

    let ds = table.dataset().unwrap();
    let charged: u64 = ds.partitions().iter().map(|p| p.budget().used()).sum();
    assert_eq!(charged, ds.cache().stats().await.bytes);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_reader_returns_its_candidate() -> Result<()> {
    let backend = Arc::new(MockBackend::with_delay(Duration::from_secs(30)));
    let table = Arc::new(EpochTable::new(1, backend, PassOptions::default()));
    table.init(dataset(1, 1))?;

    let reader = {
        let table = Arc::clone(&table);
        tokio::spawn(async move { table.get_file(FileId(0), &Default::default()).await })
    };
    while table.partition_stats(PartitionId(0))?.fetching == 0 {
        tokio::task::yield_now().await;
    }
    reader.abort();
    assert!(reader.await.unwrap_err().is_cancelled());

    let stats = table.partition_stats(PartitionId(0))?;
    assert_eq!(stats.fetching, 0);
    assert_eq!(stats.unread, 1);
    assert_eq!(stats.requested, 0);
    Ok(())
}
