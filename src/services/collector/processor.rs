// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::alias::SourceAliasTable;
use crate::common::stats::CollectorStats;
use crate::domain::error::AppError;
use crate::domain::normalize;
use crate::domain::observation::{TxObservation, TxPayload, now_millis};
use crate::services::collector::dedup::DedupIndex;
use crate::services::collector::verifier::{JobQueue, VerifierJob};
use crate::services::collector::writer::OutputWriter;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};

const EVICT_INTERVAL: Duration = Duration::from_secs(60);
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// The fan-in core: drains the shared inbound channel from a single task,
/// so the dedup index needs no locking. Exits once every connector has
/// dropped its sender and the channel is drained.
pub struct Processor {
    rx: mpsc::Receiver<TxObservation>,
    writer: OutputWriter,
    dedup: DedupIndex,
    aliases: SourceAliasTable,
    verifier: Option<Arc<JobQueue>>,
    stats: Arc<CollectorStats>,
}

impl Processor {
    pub fn new(
        rx: mpsc::Receiver<TxObservation>,
        writer: OutputWriter,
        dedup: DedupIndex,
        aliases: SourceAliasTable,
        verifier: Option<Arc<JobQueue>>,
        stats: Arc<CollectorStats>,
    ) -> Self {
        Self {
            rx,
            writer,
            dedup,
            aliases,
            verifier,
            stats,
        }
    }

    pub async fn run(mut self) -> Result<(), AppError> {
        tracing::info!(target: "processor", "Processor started");
        let mut evict = interval(EVICT_INTERVAL);
        evict.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut flush = interval(FLUSH_INTERVAL);
        flush.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe_obs = self.rx.recv() => match maybe_obs {
                    Some(obs) => self.accept(obs).await,
                    None => break,
                },
                _ = evict.tick() => {
                    let removed = self.dedup.evict_before(now_millis());
                    self.stats
                        .dedup_entries
                        .store(self.dedup.len() as u64, Ordering::Relaxed);
                    if removed > 0 {
                        tracing::debug!(target: "processor", removed, remaining = self.dedup.len(), "Evicted dedup entries");
                    }
                }
                _ = flush.tick() => self.writer.flush(),
            }
        }

        self.writer.flush();
        tracing::info!(target: "processor", "Inbound channel closed; processor drained");
        Ok(())
    }

    async fn accept(&mut self, obs: TxObservation) {
        let source = self.aliases.resolve(&obs.source).to_string();

        let (hash, summary) = match &obs.payload {
            TxPayload::Hash(hash) => (*hash, None),
            TxPayload::Raw(raw) => match normalize::decode(raw) {
                Ok(summary) => (summary.hash, Some(summary)),
                Err(e) => {
                    self.stats.decode_failed.fetch_add(1, Ordering::Relaxed);
                    if raw.is_empty() {
                        tracing::warn!(target: "processor", source = %source, error = %e, "Dropping empty envelope");
                        return;
                    }
                    tracing::warn!(
                        target: "processor",
                        source = %source,
                        error = %e,
                        "Undecodable envelope; sighting kept, first-seen suppressed"
                    );
                    (normalize::envelope_hash(raw), None)
                }
            },
        };

        // Every sighting is logged so per-source timing analysis stays possible.
        self.stats.sightings.fetch_add(1, Ordering::Relaxed);
        self.writer.record_sighting(obs.received_at_ms, hash, &source);

        if !self.dedup.observe(hash, &source, obs.received_at_ms) {
            return;
        }
        self.stats.first_seen.fetch_add(1, Ordering::Relaxed);

        if let Some(summary) = &summary {
            self.writer.record_first_seen(obs.received_at_ms, summary);
        }

        if let Some(verifier) = &self.verifier {
            let pushed = verifier
                .push(VerifierJob {
                    hash,
                    enqueued_at_ms: now_millis(),
                })
                .await;
            if pushed.dropped_oldest {
                self.stats.verifier_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
