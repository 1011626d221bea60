//! `fetchq get` – fetch URLs through the scheduler and save each body.

use anyhow::{Context, Result};
use fetchq_core::checksum;
use fetchq_core::config::FetchqConfig;
use fetchq_core::fetch::{CurlFetcher, CurlOptions};
use fetchq_core::scheduler::{AdmissionPolicy, FetchScheduler, RequestHandle, SchedulerSettings};
use fetchq_core::url_model;
use fetchq_core::{FetchResult, TransferError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

const PROGRESS_INTERVAL_MS: u64 = 500;

/// Options for `fetchq get` after CLI parsing.
#[derive(Debug)]
pub struct GetOptions {
    pub urls: Vec<String>,
    pub output_dir: PathBuf,
    pub budget: Option<usize>,
    pub fifo: bool,
    pub serialized: bool,
    pub sha256: bool,
    pub json: bool,
}

fn settings_for(cfg: &FetchqConfig, opts: &GetOptions) -> SchedulerSettings {
    let mut settings = SchedulerSettings::from(cfg);
    if let Some(budget) = opts.budget {
        settings.max_active_transfers = budget;
    }
    if opts.fifo {
        settings.admission_policy = AdmissionPolicy::Fifo;
    }
    if opts.serialized {
        settings.serialized = true;
    }
    settings
}

pub async fn run_get(cfg: &FetchqConfig, opts: GetOptions) -> Result<()> {
    std::fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("create output dir {}", opts.output_dir.display()))?;

    let fetcher = Arc::new(CurlFetcher::new(CurlOptions::from(&cfg.curl_or_default())));
    let scheduler = FetchScheduler::new(settings_for(cfg, &opts), fetcher)?;
    let _announce = (!opts.json).then(|| {
        scheduler.on_completion(|url| {
            eprintln!("\r  loaded {}", url);
        })
    });

    // Outcomes come back tagged with the index into `handles`.
    let (outcome_tx, mut outcome_rx) =
        mpsc::unbounded_channel::<(usize, Result<FetchResult, TransferError>)>();
    let mut handles: Vec<RequestHandle> = Vec::with_capacity(opts.urls.len());
    let mut failures = 0usize;

    for url in &opts.urls {
        let index = handles.len();
        let tx = outcome_tx.clone();
        match scheduler.submit(url, move |outcome| {
            let _ = tx.send((index, outcome));
        }) {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                failures += 1;
                eprintln!("skipped {}: {}", url, err);
            }
        }
    }
    drop(outcome_tx);

    let total = handles.len() as u64;
    let progress = (!opts.json && total > 0).then(|| spawn_progress(&scheduler, total));

    let mut taken: HashSet<String> = HashSet::new();
    while let Some((index, outcome)) = outcome_rx.recv().await {
        let handle = &handles[index];
        let saved = match outcome {
            Ok(result) => {
                let saved = save_body(&result, &opts.output_dir, &mut taken);
                if let Ok(path) = &saved {
                    report_success(handle, &result, path, &opts)?;
                }
                saved.map(|_| ())
            }
            Err(err) => {
                failures += 1;
                report_failure(handle, &err, opts.json)?;
                Ok(())
            }
        };
        // Release before surfacing a save error so serialized runs are not left waiting.
        handle.release()?;
        saved?;
    }

    if let Some(progress) = progress {
        let _ = progress.await;
    }

    if failures > 0 {
        anyhow::bail!("{} of {} fetch(es) failed", failures, opts.urls.len());
    }
    Ok(())
}

fn save_body(result: &FetchResult, dir: &Path, taken: &mut HashSet<String>) -> Result<PathBuf> {
    let name = url_model::output_filename(&result.url, taken);
    let path = dir.join(&name);
    std::fs::write(&path, &result.body).with_context(|| format!("write {}", path.display()))?;
    taken.insert(name);
    Ok(path)
}

fn report_success(
    handle: &RequestHandle,
    result: &FetchResult,
    path: &Path,
    opts: &GetOptions,
) -> Result<()> {
    let digest = opts.sha256.then(|| checksum::sha256_bytes(&result.body));
    if opts.json {
        let mut value = serde_json::to_value(handle.summary())?;
        value["path"] = serde_json::Value::String(path.display().to_string());
        value["bytes"] = serde_json::Value::from(result.len() as u64);
        if let Some(digest) = digest {
            value["sha256"] = serde_json::Value::String(digest);
        }
        println!("{}", value);
    } else {
        println!(
            "saved {} ({} bytes, {} ms) -> {}",
            result.url,
            result.len(),
            result.elapsed.as_millis(),
            path.display()
        );
        if let Some(digest) = digest {
            println!("  sha256 {}", digest);
        }
    }
    Ok(())
}

fn report_failure(handle: &RequestHandle, err: &TransferError, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&handle.summary())?);
    } else {
        eprintln!("failed {}", err);
    }
    Ok(())
}

/// Print a one-line status from scheduler stats until every submitted request finished.
fn spawn_progress(scheduler: &FetchScheduler, total: u64) -> tokio::task::JoinHandle<()> {
    let mut stats_rx = scheduler.watch_stats();
    tokio::spawn(async move {
        let mut last_print: Option<Instant> = None;
        loop {
            let stats = *stats_rx.borrow_and_update();
            let finished = stats.succeeded + stats.failed;
            let due = last_print
                .map(|t| t.elapsed().as_millis() as u64 >= PROGRESS_INTERVAL_MS)
                .unwrap_or(true);
            if due || finished >= total {
                eprint!(
                    "\r  {}/{} finished, {} active, {} queued  ",
                    finished, total, stats.active, stats.pending
                );
                last_print = Some(Instant::now());
            }
            if finished >= total || stats_rx.changed().await.is_err() {
                break;
            }
        }
        eprintln!();
    })
}
