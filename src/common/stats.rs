// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one source connector. Written by the connector task only;
/// read at log/render time.
#[derive(Debug, Default)]
pub struct SourceCounters {
    pub received: AtomicU64,
    pub queue_dropped: AtomicU64,
    pub malformed: AtomicU64,
    pub reconnects: AtomicU64,
}

#[derive(Debug, Default)]
pub struct CollectorStats {
    sources: DashMap<String, Arc<SourceCounters>>,
    pub sightings: AtomicU64,
    pub first_seen: AtomicU64,
    pub decode_failed: AtomicU64,
    pub writer_errors: AtomicU64,
    pub verifier_dropped: AtomicU64,
    pub dedup_entries: AtomicU64,
}

impl CollectorStats {
    pub fn source(&self, tag: &str) -> Arc<SourceCounters> {
        self.sources
            .entry(tag.to_string())
            .or_default()
            .clone()
    }

    /// One INFO line summarizing all counters, emitted on a timer.
    pub fn log_snapshot(&self) {
        for entry in self.sources.iter() {
            let c = entry.value();
            tracing::info!(
                target: "stats",
                source = %entry.key(),
                received = c.received.load(Ordering::Relaxed),
                queue_dropped = c.queue_dropped.load(Ordering::Relaxed),
                malformed = c.malformed.load(Ordering::Relaxed),
                reconnects = c.reconnects.load(Ordering::Relaxed),
                "source counters"
            );
        }
        tracing::info!(
            target: "stats",
            sightings = self.sightings.load(Ordering::Relaxed),
            first_seen = self.first_seen.load(Ordering::Relaxed),
            decode_failed = self.decode_failed.load(Ordering::Relaxed),
            writer_errors = self.writer_errors.load(Ordering::Relaxed),
            verifier_dropped = self.verifier_dropped.load(Ordering::Relaxed),
            dedup_entries = self.dedup_entries.load(Ordering::Relaxed),
            "pipeline counters"
        );
    }

    /// Prometheus-style plaintext rendering for the metrics listener.
    pub fn render(&self) -> String {
        let mut body = format!(
            concat!(
                "# TYPE collector_sightings counter\ncollector_sightings {}\n",
                "# TYPE collector_first_seen counter\ncollector_first_seen {}\n",
                "# TYPE collector_decode_failed counter\ncollector_decode_failed {}\n",
                "# TYPE collector_writer_errors counter\ncollector_writer_errors {}\n",
                "# TYPE collector_verifier_dropped counter\ncollector_verifier_dropped {}\n",
                "# TYPE collector_dedup_entries gauge\ncollector_dedup_entries {}\n"
            ),
            self.sightings.load(Ordering::Relaxed),
            self.first_seen.load(Ordering::Relaxed),
            self.decode_failed.load(Ordering::Relaxed),
            self.writer_errors.load(Ordering::Relaxed),
            self.verifier_dropped.load(Ordering::Relaxed),
            self.dedup_entries.load(Ordering::Relaxed),
        );

        for entry in self.sources.iter() {
            let c = entry.value();
            body.push_str(&format!(
                "# TYPE source_received counter\nsource_received{{source=\"{}\"}} {}\n",
                entry.key(),
                c.received.load(Ordering::Relaxed)
            ));
            body.push_str(&format!(
                "# TYPE source_queue_dropped counter\nsource_queue_dropped{{source=\"{}\"}} {}\n",
                entry.key(),
                c.queue_dropped.load(Ordering::Relaxed)
            ));
            body.push_str(&format!(
                "# TYPE source_malformed counter\nsource_malformed{{source=\"{}\"}} {}\n",
                entry.key(),
                c.malformed.load(Ordering::Relaxed)
            ));
        }

        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_tag_returns_same_counters() {
        let stats = CollectorStats::default();
        let a = stats.source("blx");
        a.received.fetch_add(3, Ordering::Relaxed);
        let b = stats.source("blx");
        assert_eq!(b.received.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn render_includes_source_labels() {
        let stats = CollectorStats::default();
        stats
            .source("eden")
            .queue_dropped
            .fetch_add(2, Ordering::Relaxed);
        let body = stats.render();
        assert!(body.contains("source_queue_dropped{source=\"eden\"} 2"));
        assert!(body.contains("collector_sightings 0"));
    }
}
