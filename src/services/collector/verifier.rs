// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::stats::CollectorStats;
use crate::domain::observation::now_millis;
use crate::infrastructure::network::provider::CheckNodeProvider;
use crate::services::collector::rotate::RotatingCsv;
use alloy::primitives::B256;
use alloy::providers::Provider;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout};
use tokio_util::sync::CancellationToken;

pub const VERIFIER_HEADER: &str = "timestamp_ms,hash,result";

const QUEUE_CAPACITY: usize = 10_000;
const WORKER_COUNT: usize = 4;
const RPC_TIMEOUT: Duration = Duration::from_secs(3);
// Initial call plus two retries.
const RPC_ATTEMPTS: usize = 3;
const RPC_RETRY_DELAY: Duration = Duration::from_millis(500);
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Known,
    Unknown,
    Error,
}

impl VerifyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyOutcome::Known => "known",
            VerifyOutcome::Unknown => "unknown",
            VerifyOutcome::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifierJob {
    pub hash: B256,
    pub enqueued_at_ms: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct JobPushResult {
    pub dropped_oldest: bool,
}

/// Bounded FIFO job queue. Pushes never block: when full, the oldest pending
/// job is discarded so the verifier lags rather than stalls.
pub struct JobQueue {
    capacity: usize,
    queue: Mutex<VecDeque<VerifierJob>>,
    notify: Notify,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub async fn push(&self, job: VerifierJob) -> JobPushResult {
        let mut queue = self.queue.lock().await;
        let dropped_oldest = if queue.len() >= self.capacity {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(job);
        drop(queue);
        self.notify.notify_one();
        JobPushResult { dropped_oldest }
    }

    pub async fn pop(&self, shutdown: &CancellationToken) -> Option<VerifierJob> {
        loop {
            let notified = self.notify.notified();
            {
                let mut queue = self.queue.lock().await;
                if let Some(job) = queue.pop_front() {
                    return Some(job);
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = notified => {}
            }
        }
    }
}

pub struct VerifierHandle {
    pub queue: Arc<JobQueue>,
    workers: Vec<JoinHandle<()>>,
    folder: JoinHandle<()>,
}

impl VerifierHandle {
    /// Await worker and folder termination; outcomes already in flight are
    /// folded into the log before this returns.
    pub async fn join(self) {
        for worker in self.workers {
            let _ = worker.await;
        }
        let _ = self.folder.await;
    }
}

/// Start the verifier: a worker pool querying the reference node and a
/// folder task owning the verifier log.
pub fn spawn(
    provider: CheckNodeProvider,
    out_dir: &Path,
    uid: &str,
    stats: Arc<CollectorStats>,
    shutdown: CancellationToken,
) -> VerifierHandle {
    let queue = Arc::new(JobQueue::new(QUEUE_CAPACITY));
    let (results_tx, results_rx) = mpsc::channel::<(u64, B256, VerifyOutcome)>(1024);

    let mut workers = Vec::with_capacity(WORKER_COUNT);
    for _ in 0..WORKER_COUNT {
        workers.push(tokio::spawn(worker_loop(
            provider.clone(),
            queue.clone(),
            results_tx.clone(),
            shutdown.clone(),
        )));
    }
    drop(results_tx);

    let folder = tokio::spawn(folder_loop(
        results_rx,
        RotatingCsv::new(out_dir, uid, "verifier", VERIFIER_HEADER),
        stats,
    ));

    VerifierHandle {
        queue,
        workers,
        folder,
    }
}

async fn worker_loop(
    provider: CheckNodeProvider,
    queue: Arc<JobQueue>,
    results: mpsc::Sender<(u64, B256, VerifyOutcome)>,
    shutdown: CancellationToken,
) {
    while let Some(job) = queue.pop(&shutdown).await {
        let outcome = check_hash(&provider, job.hash).await;
        if results.send((now_millis(), job.hash, outcome)).await.is_err() {
            break;
        }
    }
}

async fn check_hash(provider: &CheckNodeProvider, hash: B256) -> VerifyOutcome {
    let mut last_error = String::new();
    for attempt in 1..=RPC_ATTEMPTS {
        last_error = match timeout(RPC_TIMEOUT, provider.get_transaction_by_hash(hash)).await {
            Ok(Ok(Some(_))) => return VerifyOutcome::Known,
            Ok(Ok(None)) => return VerifyOutcome::Unknown,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "timeout".to_string(),
        };
        if attempt < RPC_ATTEMPTS {
            tracing::debug!(
                target: "verifier",
                attempt,
                %hash,
                error = %last_error,
                "Retrying check-node lookup"
            );
            sleep(RPC_RETRY_DELAY).await;
        }
    }

    tracing::debug!(target: "verifier", %hash, error = %last_error, "Reference lookup failed");
    VerifyOutcome::Error
}

async fn folder_loop(
    mut results: mpsc::Receiver<(u64, B256, VerifyOutcome)>,
    mut log: RotatingCsv,
    stats: Arc<CollectorStats>,
) {
    let mut flush = interval(FLUSH_INTERVAL);
    loop {
        tokio::select! {
            maybe = results.recv() => match maybe {
                Some((ts_ms, hash, outcome)) => {
                    let row = format!("{ts_ms},{hash},{}", outcome.as_str());
                    if !log.append(ts_ms, &row) {
                        stats.writer_errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
                None => break,
            },
            _ = flush.tick() => log.flush(),
        }
    }
    log.flush();
    tracing::info!(target: "verifier", "Verifier log closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(marker: u8) -> VerifierJob {
        VerifierJob {
            hash: B256::from([marker; 32]),
            enqueued_at_ms: marker as u64,
        }
    }

    #[tokio::test]
    async fn queue_drops_oldest_when_full_and_pops_fifo() {
        let q = JobQueue::new(2);
        let shutdown = CancellationToken::new();

        assert!(!q.push(job(1)).await.dropped_oldest);
        assert!(!q.push(job(2)).await.dropped_oldest);
        assert!(q.push(job(3)).await.dropped_oldest);

        let first = q.pop(&shutdown).await.unwrap();
        assert_eq!(first.hash, B256::from([2u8; 32]));
        let second = q.pop(&shutdown).await.unwrap();
        assert_eq!(second.hash, B256::from([3u8; 32]));
    }

    #[tokio::test]
    async fn pop_returns_none_on_shutdown() {
        let q = JobQueue::new(2);
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(q.pop(&shutdown).await.is_none());
    }

    #[tokio::test]
    async fn outcomes_fold_into_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let stats = Arc::new(CollectorStats::default());
        let (tx, rx) = mpsc::channel(8);
        let log = RotatingCsv::new(dir.path(), "abc123", "verifier", VERIFIER_HEADER);
        let folder = tokio::spawn(folder_loop(rx, log, stats));

        let ts = 1_693_526_000_000u64;
        tx.send((ts, B256::from([0xaa; 32]), VerifyOutcome::Unknown))
            .await
            .unwrap();
        tx.send((ts + 1, B256::from([0xbb; 32]), VerifyOutcome::Known))
            .await
            .unwrap();
        drop(tx);
        folder.await.unwrap();

        let day = crate::services::collector::rotate::day_bucket(ts);
        let body = std::fs::read_to_string(
            dir.path()
                .join(format!("abc123_verifier-{}.csv", day.format("%Y-%m-%d"))),
        )
        .unwrap();
        let mut lines = body.lines();
        assert_eq!(lines.next(), Some("timestamp_ms,hash,result"));
        assert!(lines.next().unwrap().ends_with(",unknown"));
        assert!(lines.next().unwrap().ends_with(",known"));
    }
}
