// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::app::config::Settings;
use crate::common::alias::SourceAliasTable;
use crate::common::parsing::is_websocket_url;
use crate::common::stats::CollectorStats;
use crate::domain::error::AppError;
use crate::infrastructure::network::connector::{SourceStream, run_connector};
use crate::infrastructure::network::framed::FramedTcpSource;
use crate::infrastructure::network::grpc::GrpcSource;
use crate::infrastructure::network::provider::ConnectionFactory;
use crate::infrastructure::network::ws::WsSource;
use crate::services::collector::dedup::DedupIndex;
use crate::services::collector::processor::Processor;
use crate::services::collector::queue::inbound_channel;
use crate::services::collector::verifier;
use crate::services::collector::writer::OutputWriter;
use crate::services::metrics::spawn_metrics_server;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;

const CONNECTOR_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Start every component, then block until a termination signal. Teardown
/// order: cancel connectors, close the inbound channel, let the processor
/// drain, flush and close the logs.
pub async fn run(
    settings: &Settings,
    aliases: SourceAliasTable,
    stats: Arc<CollectorStats>,
) -> Result<(), AppError> {
    let out_dir = PathBuf::from(settings.out.as_deref().unwrap_or_default());
    let uid = settings.uid_or_generate();
    tracing::info!(target: "supervisor", %uid, out = %out_dir.display(), "Starting collector");

    let sources = build_sources(settings);
    if sources.is_empty() {
        return Err(AppError::Config("No runnable sources after URL parsing".into()));
    }

    let shutdown = CancellationToken::new();
    let (tx, rx) = inbound_channel(settings.queue_capacity);
    let writer = OutputWriter::new(&out_dir, &uid, stats.clone())?;

    let verifier_handle = match settings.check_node_uri.as_deref() {
        Some(uri) => match ConnectionFactory::check_node(uri).await {
            Ok(provider) => {
                tracing::info!(target: "supervisor", check_node = %uri, "Verifier enabled");
                Some(verifier::spawn(
                    provider,
                    &out_dir,
                    &uid,
                    stats.clone(),
                    shutdown.clone(),
                ))
            }
            Err(e) => {
                tracing::error!(target: "supervisor", error = %e, "Check node unavailable; verifier disabled");
                None
            }
        },
        None => None,
    };

    let processor = Processor::new(
        rx,
        writer,
        DedupIndex::new(Duration::from_secs(settings.dedup_horizon_secs)),
        aliases,
        verifier_handle.as_ref().map(|v| v.queue.clone()),
        stats.clone(),
    );
    let processor_task = tokio::spawn(processor.run());

    if let Some(port) = settings.metrics_port {
        let _ = spawn_metrics_server(port, stats.clone(), shutdown.clone()).await;
    }

    let stats_task = tokio::spawn(stats_logger(stats.clone(), shutdown.clone()));

    let mut connectors = JoinSet::new();
    for source in sources {
        let counters = stats.source(source.tag());
        connectors.spawn(run_connector(
            source,
            tx.clone(),
            counters,
            shutdown.clone(),
        ));
    }
    drop(tx);

    wait_for_signal().await;
    tracing::info!(target: "supervisor", "Shutdown signal received");
    shutdown.cancel();

    let drained = timeout(CONNECTOR_DRAIN_TIMEOUT, async {
        while connectors.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!(target: "supervisor", "Connectors still running after 10s; aborting");
        connectors.abort_all();
        while connectors.join_next().await.is_some() {}
    }

    // All senders are gone now; the processor drains what is queued and exits.
    match processor_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(target: "supervisor", error = %e, "Processor exited with error");
        }
        Err(e) => tracing::error!(target: "supervisor", error = %e, "Processor task join failed"),
    }

    if let Some(handle) = verifier_handle {
        handle.join().await;
    }
    let _ = stats_task.await;

    stats.log_snapshot();
    tracing::info!(target: "supervisor", "Collector stopped");
    Ok(())
}

/// One connector per configured upstream. Duplicate URLs intentionally get
/// independent connectors.
fn build_sources(settings: &Settings) -> Vec<Box<dyn SourceStream>> {
    let mut sources: Vec<Box<dyn SourceStream>> = Vec::new();

    for url in settings.node_urls() {
        if is_websocket_url(&url) {
            sources.push(Box::new(WsSource::node(&url)));
        } else if url.starts_with("tcp://") {
            sources.push(Box::new(FramedTcpSource::new(&url)));
        } else {
            tracing::warn!(target: "supervisor", %url, "Skipping node with unsupported scheme");
        }
    }

    if let Some(token) = settings.blx_auth_header.as_deref() {
        if is_websocket_url(&settings.blx_uri) {
            sources.push(Box::new(WsSource::bloxroute(&settings.blx_uri, token)));
        } else {
            sources.push(Box::new(GrpcSource::bloxroute(&settings.blx_uri, token)));
        }
    }

    if let Some(token) = settings.eden_auth_header.as_deref() {
        if is_websocket_url(&settings.eden_uri) {
            sources.push(Box::new(WsSource::eden(&settings.eden_uri, token)));
        } else {
            sources.push(Box::new(GrpcSource::eden(&settings.eden_uri, token)));
        }
    }

    if let Some(key) = settings.chainbound_api_key.as_deref() {
        sources.push(Box::new(GrpcSource::chainbound(
            &settings.chainbound_uri,
            key,
        )));
    }

    sources
}

async fn stats_logger(stats: Arc<CollectorStats>, shutdown: CancellationToken) {
    let mut tick = interval(STATS_INTERVAL);
    tick.tick().await; // immediate first tick is noise
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => stats.log_snapshot(),
        }
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(target: "supervisor", error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
