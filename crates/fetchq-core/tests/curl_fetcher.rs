//! libcurl fetcher through the scheduler, using file:// URLs on temp files.

use std::sync::Arc;
use std::time::Duration;

use fetchq_core::fetch::{CurlFetcher, CurlOptions};
use fetchq_core::config::CurlConfig;
use fetchq_core::{FetchScheduler, LoadPriority, RequestState, SchedulerSettings};
use tempfile::tempdir;

fn curl_scheduler() -> FetchScheduler {
    let settings = SchedulerSettings {
        tick_interval: Duration::from_millis(2),
        leak_check: false,
        ..SchedulerSettings::default()
    };
    FetchScheduler::new(settings, Arc::new(CurlFetcher::new(CurlOptions::default())))
        .expect("inside a runtime")
}

fn file_url(path: &std::path::Path) -> String {
    url::Url::from_file_path(path).unwrap().to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn local_files_are_fetched() {
    let dir = tempdir().unwrap();
    let body: Vec<u8> = (0u8..=255).cycle().take(256 * 1024).collect();
    let path = dir.path().join("atlas.bundle");
    std::fs::write(&path, &body).unwrap();

    let sched = curl_scheduler();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = sched
        .submit(&file_url(&path), move |outcome| {
            let _ = tx.send(outcome);
        })
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(30), rx)
        .await
        .expect("transfer finished")
        .unwrap()
        .expect("file fetch succeeds");
    assert_eq!(result.len(), body.len());
    assert_eq!(&result.body[..], &body[..]);
    assert_eq!(handle.finished().await, RequestState::Succeeded);
    handle.release().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_local_file_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.bundle");

    let sched = curl_scheduler();
    let handle = sched.submit_detached(&file_url(&path)).unwrap();
    let state = tokio::time::timeout(Duration::from_secs(30), handle.finished())
        .await
        .expect("transfer finished");
    assert_eq!(state, RequestState::Failed);
    assert!(handle.error_message().is_some_and(|m| !m.is_empty()));
    handle.release().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn several_files_share_the_budget() {
    let dir = tempdir().unwrap();
    let sched = curl_scheduler();
    let mut handles = Vec::new();
    for i in 0..12 {
        let path = dir.path().join(format!("part-{i}.bin"));
        std::fs::write(&path, vec![i as u8; 4096]).unwrap();
        handles.push(sched.submit_detached(&file_url(&path)).unwrap());
    }
    tokio::time::timeout(Duration::from_secs(30), sched.idle())
        .await
        .expect("all transfers finished");

    for handle in &handles {
        assert_eq!(handle.state(), RequestState::Succeeded);
        handle.release().unwrap();
    }
    let stats = sched.stats();
    assert!(stats.peak_active <= sched.budget().max_active());
    assert_eq!(stats.succeeded, 12);
    assert_eq!(stats.outstanding, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn low_priority_transfer_runs_rate_capped() {
    let dir = tempdir().unwrap();
    let body = vec![7u8; 8 * 1024];
    let path = dir.path().join("background.bin");
    std::fs::write(&path, &body).unwrap();

    let opts = CurlOptions::from(&CurlConfig {
        low_priority_max_recv_bytes_per_sec: Some(1024 * 1024),
        ..CurlConfig::default()
    });
    assert_eq!(opts.recv_speed_limit(LoadPriority::Low), Some(1024 * 1024));
    let settings = SchedulerSettings {
        tick_interval: Duration::from_millis(2),
        load_priority: LoadPriority::Low,
        leak_check: false,
        ..SchedulerSettings::default()
    };
    let sched = FetchScheduler::new(settings, Arc::new(CurlFetcher::new(opts))).unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = sched
        .submit(&file_url(&path), move |outcome| {
            let _ = tx.send(outcome);
        })
        .unwrap();
    let result = tokio::time::timeout(Duration::from_secs(30), rx)
        .await
        .expect("transfer finished")
        .unwrap()
        .expect("capped fetch succeeds");
    assert_eq!(&result.body[..], &body[..]);
    handle.release().unwrap();
}
