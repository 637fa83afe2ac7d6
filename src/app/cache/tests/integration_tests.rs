//! End-to-end scenarios for the cache manager against a mock downloader

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use filetime::{set_file_mtime, FileTime};
use reqwest::header::{HeaderMap, IF_MODIFIED_SINCE};
use tempfile::TempDir;
use tokio::fs;

use super::MockDownloader;
use crate::app::cache::{CacheConfig, CacheManager, ImportOptions, Resolution, Strategy};
use crate::errors::CacheError;

const URL: &str = "https://img.example.com/a/b/pic.png";

async fn create_manager(downloader: Arc<MockDownloader>, budget: u64) -> (TempDir, CacheManager) {
    let temp_dir = TempDir::new().unwrap();
    let config = CacheConfig::with_cache_root(temp_dir.path().join("cache")).with_max_cache_size(budget);
    let manager = CacheManager::new(config, downloader).await.unwrap();
    (temp_dir, manager)
}

async fn seed_file(manager: &CacheManager, file_name: &str, contents: &[u8], unix_time: i64) {
    let path = manager.cache_root().join(file_name);
    fs::write(&path, contents).await.unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(unix_time, 0)).unwrap();
}

/// Wait until the downloader has been called `count` times
async fn wait_for_calls(downloader: &MockDownloader, count: usize) {
    for _ in 0..200 {
        if downloader.call_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("downloader was never called {} times", count);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_stream() {
    let downloader = Arc::new(
        MockDownloader::new()
            .respond(200, b"pixels")
            .with_delay(Duration::from_millis(50)),
    );
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let name = manager.name_for(URL);

    let first = manager.next_consumer_id();
    let second = manager.next_consumer_id();
    manager.lock_cache_file(&name, first);
    manager.lock_cache_file(&name, second);

    let stream1 = manager
        .observable_for(URL, first, Strategy::Immutable, None)
        .unwrap();
    let stream2 = manager
        .observable_for(URL, second, Strategy::Immutable, None)
        .unwrap();
    assert!(stream1.ptr_eq(&stream2));

    let (results1, results2) = tokio::join!(stream1.collect_all(), stream2.collect_all());
    let expected = vec![Resolution::found(manager.path_for(URL).unwrap(), &name)];
    assert_eq!(results1, expected);
    assert_eq!(results2, expected);
    assert_eq!(downloader.call_count(), 1);
}

#[tokio::test]
async fn test_late_subscriber_gets_replay() {
    let downloader = Arc::new(MockDownloader::new().respond(200, b"pixels"));
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let guard = manager.lock(manager.name_for(URL));

    let stream = manager
        .observable_for(URL, guard.consumer(), Strategy::Immutable, None)
        .unwrap();
    let first = stream.collect_all().await;
    let late = stream.collect_all().await;

    assert_eq!(first.len(), 1);
    assert_eq!(first, late);
    assert_eq!(downloader.call_count(), 1);
}

#[tokio::test]
async fn test_stream_requires_lock() {
    let downloader = Arc::new(MockDownloader::new());
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;

    let result = manager.observable_for(URL, manager.next_consumer_id(), Strategy::Immutable, None);
    match result {
        Err(CacheError::LockRequired { file_name }) => assert_eq!(file_name, manager.name_for(URL)),
        other => panic!("Expected LockRequired, got {:?}", other),
    }
    assert_eq!(downloader.call_count(), 0);
}

#[tokio::test]
async fn test_release_tears_down_stream() {
    let downloader = Arc::new(MockDownloader::new().respond(200, b"pixels"));
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let name = manager.name_for(URL);
    let consumer = manager.next_consumer_id();

    manager.lock_cache_file(&name, consumer);
    let stream1 = manager
        .observable_for(URL, consumer, Strategy::Immutable, None)
        .unwrap();
    stream1.collect_all().await;
    assert!(manager.unlock_cache_file(&name, consumer));
    assert!(!manager.is_locked(&name));

    manager.lock_cache_file(&name, consumer);
    let stream2 = manager
        .observable_for(URL, consumer, Strategy::Immutable, None)
        .unwrap();
    assert!(!stream1.ptr_eq(&stream2));

    // The file is cached now, so the fresh stream serves it locally
    assert_eq!(stream2.collect_all().await.len(), 1);
    assert_eq!(downloader.call_count(), 1);
}

#[tokio::test]
async fn test_release_during_fetch_then_new_request() {
    let downloader = Arc::new(
        MockDownloader::new()
            .fail()
            .respond(200, b"second")
            .with_delay(Duration::from_millis(100)),
    );
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let name = manager.name_for(URL);

    let first = manager.lock(&name);
    let abandoned = manager
        .observable_for(URL, first.consumer(), Strategy::Immutable, None)
        .unwrap();
    let abandoned_results = tokio::spawn(async move { abandoned.collect_all().await });

    // Walk away while the first download is still on the wire
    wait_for_calls(&downloader, 1).await;
    drop(first);
    assert!(!manager.is_locked(&name));
    assert_eq!(downloader.in_flight(), 1);

    let second = manager.lock(&name);
    let results = manager
        .observable_for(URL, second.consumer(), Strategy::Immutable, None)
        .unwrap()
        .collect_all()
        .await;
    drop(second);

    // The first download failing must not take the second one down with it
    let target = manager.path_for(URL).unwrap();
    assert_eq!(results, vec![Resolution::found(&target, &name)]);
    assert_eq!(fs::read(&target).await.unwrap(), b"second");
    assert_eq!(
        abandoned_results.await.unwrap(),
        vec![Resolution::missing(&name)]
    );
    assert_eq!(downloader.call_count(), 2);
    assert_eq!(manager.stats().await.unwrap().cached_files_count, 1);
}

#[tokio::test]
async fn test_import_during_fetch() {
    let downloader = Arc::new(
        MockDownloader::new()
            .respond(200, b"downloaded")
            .with_delay(Duration::from_millis(100)),
    );
    let (temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let name = manager.name_for(URL);
    let target = manager.path_for(URL).unwrap();

    let guard = manager.lock(&name);
    let stream = manager
        .observable_for(URL, guard.consumer(), Strategy::Immutable, None)
        .unwrap();
    let collector = {
        let stream = stream.clone();
        tokio::spawn(async move { stream.collect_all().await })
    };
    wait_for_calls(&downloader, 1).await;

    let source = temp.path().join("local.png");
    fs::write(&source, b"imported").await.unwrap();
    let imported = manager
        .import_local_file(&source, URL, ImportOptions::default())
        .await
        .unwrap();
    assert_eq!(imported.path, Some(target.clone()));
    assert_eq!(fs::read(&target).await.unwrap(), b"imported");

    // Both writes land whole; the download finishes last and wins
    let expected = Resolution::found(&target, &name);
    assert_eq!(collector.await.unwrap(), vec![expected.clone(), expected]);
    assert_eq!(fs::read(&target).await.unwrap(), b"downloaded");
    assert_eq!(manager.stats().await.unwrap().cached_files_count, 1);
    drop(guard);
}

#[tokio::test]
async fn test_immutable_hit_never_downloads() {
    let downloader = Arc::new(MockDownloader::new().respond(200, b"new"));
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let name = manager.name_for(URL);
    seed_file(&manager, &name, b"old", 1_700_000_000).await;

    let guard = manager.lock(&name);
    let results = manager
        .observable_for(URL, guard.consumer(), Strategy::Immutable, None)
        .unwrap()
        .collect_all()
        .await;

    assert_eq!(results, vec![Resolution::found(manager.path_for(URL).unwrap(), &name)]);
    assert_eq!(downloader.call_count(), 0);
    assert_eq!(fs::read(manager.path_for(URL).unwrap()).await.unwrap(), b"old");
}

#[tokio::test]
async fn test_mutable_not_modified_emits_once() {
    let downloader = Arc::new(MockDownloader::new().respond(304, b""));
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let name = manager.name_for(URL);
    // 1994-11-06 08:49:37 UTC
    seed_file(&manager, &name, b"old", 784_111_777).await;

    let guard = manager.lock(&name);
    let results = manager
        .observable_for(URL, guard.consumer(), Strategy::Mutable, None)
        .unwrap()
        .collect_all()
        .await;

    assert_eq!(results.len(), 1);
    assert!(results[0].is_resolved());

    let calls = downloader.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].headers[IF_MODIFIED_SINCE], "Sun, 06 Nov 1994 08:49:37 GMT");
    assert_eq!(fs::read(manager.path_for(URL).unwrap()).await.unwrap(), b"old");
}

#[tokio::test]
async fn test_mutable_fresh_copy_emits_twice() {
    let downloader = Arc::new(MockDownloader::new().respond(200, b"new"));
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let name = manager.name_for(URL);
    seed_file(&manager, &name, b"old", 1_700_000_000).await;

    let guard = manager.lock(&name);
    let results = manager
        .observable_for(URL, guard.consumer(), Strategy::Mutable, None)
        .unwrap()
        .collect_all()
        .await;

    let expected = Resolution::found(manager.path_for(URL).unwrap(), &name);
    assert_eq!(results, vec![expected.clone(), expected]);
    assert_eq!(downloader.call_count(), 1);
    assert_eq!(fs::read(manager.path_for(URL).unwrap()).await.unwrap(), b"new");
}

#[tokio::test]
async fn test_mutable_failed_revalidation_keeps_stale_copy() {
    let downloader = Arc::new(MockDownloader::new().respond(500, b""));
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let name = manager.name_for(URL);
    seed_file(&manager, &name, b"old", 1_700_000_000).await;

    let guard = manager.lock(&name);
    let results = manager
        .observable_for(URL, guard.consumer(), Strategy::Mutable, None)
        .unwrap()
        .collect_all()
        .await;

    assert_eq!(results.len(), 1);
    assert!(results[0].is_resolved());
    assert_eq!(fs::read(manager.path_for(URL).unwrap()).await.unwrap(), b"old");
}

#[tokio::test]
async fn test_failed_fetch_resolves_to_no_path() {
    let downloader = Arc::new(MockDownloader::new().fail());
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let name = manager.name_for(URL);

    let guard = manager.lock(&name);
    let results = manager
        .observable_for(URL, guard.consumer(), Strategy::Immutable, None)
        .unwrap()
        .collect_all()
        .await;

    assert_eq!(results, vec![Resolution::missing(&name)]);
    assert!(!manager.exists(&name).await.unwrap());

    // Neither the target nor the partial temp file is left behind
    let mut dir = fs::read_dir(manager.cache_root()).await.unwrap();
    assert!(dir.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn test_error_status_resolves_to_no_path() {
    let downloader = Arc::new(MockDownloader::new().respond(404, b"missing"));
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let name = manager.name_for(URL);

    let guard = manager.lock(&name);
    let results = manager
        .observable_for(URL, guard.consumer(), Strategy::Mutable, None)
        .unwrap()
        .collect_all()
        .await;

    assert_eq!(results, vec![Resolution::missing(&name)]);
    assert!(!manager.exists(&name).await.unwrap());
}

#[tokio::test]
async fn test_headers_reach_downloader() {
    let downloader = Arc::new(MockDownloader::new().respond(200, b"pixels"));
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let guard = manager.lock(manager.name_for(URL));

    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer secret".parse().unwrap());
    manager
        .observable_with_headers(URL, guard.consumer(), Strategy::Immutable, None, headers)
        .unwrap()
        .collect_all()
        .await;

    let calls = downloader.calls();
    assert_eq!(calls[0].url, URL);
    assert_eq!(calls[0].headers["authorization"], "Bearer secret");
    assert!(calls[0].headers.get(IF_MODIFIED_SINCE).is_none());
}

#[tokio::test]
async fn test_download_sweeps_unlocked_files_first() {
    let downloader = Arc::new(MockDownloader::new().respond(200, b"0123456789"));
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 150).await;
    seed_file(&manager, "oldest.bin", &[0u8; 100], 1_600_000_000).await;
    seed_file(&manager, "older.bin", &[0u8; 100], 1_650_000_000).await;
    let _pin = manager.lock("oldest.bin");

    let name = manager.name_for(URL);
    let guard = manager.lock(&name);
    manager
        .observable_for(URL, guard.consumer(), Strategy::Immutable, None)
        .unwrap()
        .collect_all()
        .await;

    assert!(manager.exists("oldest.bin").await.unwrap());
    assert!(!manager.exists("older.bin").await.unwrap());
    assert!(manager.exists(&name).await.unwrap());
}

#[tokio::test]
async fn test_explicit_sweep() {
    let downloader = Arc::new(MockDownloader::new());
    let (_temp, manager) = create_manager(downloader, 100).await;
    seed_file(&manager, "a.bin", &[0u8; 80], 1_600_000_000).await;
    seed_file(&manager, "b.bin", &[0u8; 80], 1_650_000_000).await;

    let report = manager.sweep().await;
    assert_eq!(report.evicted, vec!["a.bin"]);
    assert_eq!(report.bytes_freed, 80);
    assert_eq!(manager.stats().await.unwrap().total_cache_size, 80);
}

#[tokio::test]
async fn test_flush_everything() {
    let downloader = Arc::new(MockDownloader::new());
    let (_temp, manager) = create_manager(downloader, 0).await;
    seed_file(&manager, "a.bin", b"1", 1_700_000_000).await;
    seed_file(&manager, "b.png", b"2", 1_700_000_000).await;

    assert!(manager.flush("").await.unwrap());
    assert!(!manager.exists("a.bin").await.unwrap());
    assert!(!manager.exists("b.png").await.unwrap());

    // Flushing an already empty cache still succeeds
    assert!(manager.flush("").await.unwrap());
}

#[tokio::test]
async fn test_flush_single_entry() {
    let downloader = Arc::new(MockDownloader::new());
    let (_temp, manager) = create_manager(downloader, 0).await;
    seed_file(&manager, "a.bin", b"1", 1_700_000_000).await;
    seed_file(&manager, "b.bin", b"2", 1_700_000_000).await;

    assert!(manager.flush("a.bin").await.unwrap());
    assert!(!manager.exists("a.bin").await.unwrap());
    assert!(manager.exists("b.bin").await.unwrap());
}

#[tokio::test]
async fn test_resolve_local_path() {
    let downloader = Arc::new(MockDownloader::new().respond(200, b"pixels"));
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;

    let path = manager.resolve_local_path(URL).await.unwrap();
    assert_eq!(path, Some(manager.path_for(URL).unwrap()));
    assert!(!manager.is_locked(&manager.name_for(URL)));

    // Second call is served from disk
    let again = manager.resolve_local_path(URL).await.unwrap();
    assert_eq!(again, path);
    assert_eq!(downloader.call_count(), 1);
}

#[tokio::test]
async fn test_resolve_local_path_failure() {
    let downloader = Arc::new(MockDownloader::new().respond(404, b""));
    let (_temp, manager) = create_manager(downloader, 0).await;

    assert_eq!(manager.resolve_local_path(URL).await.unwrap(), None);
}

#[tokio::test]
async fn test_empty_url_short_circuits() {
    let downloader = Arc::new(MockDownloader::new().respond(200, b"pixels"));
    let (_temp, manager) = create_manager(Arc::clone(&downloader), 0).await;

    // No lock held, and none needed
    let results = manager
        .observable_for("", manager.next_consumer_id(), Strategy::Mutable, None)
        .unwrap()
        .collect_all()
        .await;

    assert_eq!(results, vec![Resolution::missing("")]);
    assert_eq!(manager.resolve_local_path("").await.unwrap(), None);
    assert_eq!(downloader.call_count(), 0);
}

#[tokio::test]
async fn test_import_copies_with_mtime() {
    let downloader = Arc::new(MockDownloader::new());
    let (temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let source = temp.path().join("local.png");
    fs::write(&source, b"prewarmed").await.unwrap();

    let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    let result = manager
        .import_local_file(&source, URL, ImportOptions::default().with_modified_at(modified))
        .await
        .unwrap();

    let target = manager.path_for(URL).unwrap();
    assert_eq!(result.url, URL);
    assert_eq!(result.path, Some(target.clone()));
    assert!(source.exists());
    assert_eq!(fs::read(&target).await.unwrap(), b"prewarmed");
    assert_eq!(fs::metadata(&target).await.unwrap().modified().unwrap(), modified);

    // Imported files are served without touching the network
    assert_eq!(manager.resolve_local_path(URL).await.unwrap(), Some(target));
    assert_eq!(downloader.call_count(), 0);
}

#[tokio::test]
async fn test_import_moves_source() {
    let downloader = Arc::new(MockDownloader::new());
    let (temp, manager) = create_manager(downloader, 0).await;
    let source = temp.path().join("local.png");
    fs::write(&source, b"prewarmed").await.unwrap();

    let created = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
    let result = manager
        .import_local_file(&source, URL, ImportOptions::moving().with_created_at(created))
        .await
        .unwrap();

    let target = manager.path_for(URL).unwrap();
    assert_eq!(result.path, Some(target.clone()));
    assert!(!source.exists());
    assert_eq!(fs::metadata(&target).await.unwrap().modified().unwrap(), created);
}

#[tokio::test]
async fn test_import_of_missing_source() {
    let downloader = Arc::new(MockDownloader::new());
    let (temp, manager) = create_manager(downloader, 0).await;

    let result = manager
        .import_local_file(&temp.path().join("nope.png"), URL, ImportOptions::default())
        .await
        .unwrap();

    assert_eq!(result.path, None);
    assert!(!manager.exists(&manager.name_for(URL)).await.unwrap());
}

#[tokio::test]
async fn test_import_notifies_live_stream() {
    let downloader = Arc::new(MockDownloader::new());
    let (temp, manager) = create_manager(Arc::clone(&downloader), 0).await;
    let name = manager.name_for(URL);
    seed_file(&manager, &name, b"old", 1_700_000_000).await;

    let guard = manager.lock(&name);
    let stream = manager
        .observable_for(URL, guard.consumer(), Strategy::Immutable, None)
        .unwrap();
    assert_eq!(stream.collect_all().await.len(), 1);

    let source = temp.path().join("local.png");
    fs::write(&source, b"replacement").await.unwrap();
    manager
        .import_local_file(&source, URL, ImportOptions::default())
        .await
        .unwrap();

    let expected = Resolution::found(manager.path_for(URL).unwrap(), &name);
    assert_eq!(stream.snapshot(), vec![expected.clone(), expected]);
    assert_eq!(fs::read(manager.path_for(URL).unwrap()).await.unwrap(), b"replacement");
}
