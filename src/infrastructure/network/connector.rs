// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::stats::SourceCounters;
use crate::domain::error::AppError;
use crate::domain::observation::TxObservation;
use crate::infrastructure::network::backoff::Backoff;
use crate::services::collector::queue::TxSender;
use alloy::primitives::{B256, Bytes};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

// Sustained malformed frames above this rate force a reconnect.
const MALFORMED_PER_SEC_LIMIT: u32 = 10;
const DROP_WARN_EVERY: u64 = 1_000;

/// One decoded wire frame from an upstream subscription. The transport's own
/// payload shape never crosses this boundary.
#[derive(Debug, Clone)]
pub enum Frame {
    Hash(B256),
    Raw(Bytes),
    Heartbeat,
    Malformed(String),
}

/// Capability set every source variant supplies. The shared driver owns the
/// connection lifecycle; variants only know how to connect, subscribe, and
/// decode one message.
#[async_trait]
pub trait SourceStream: Send {
    /// Stable raw identifier stamped on every observation.
    fn tag(&self) -> &str;

    /// Open the transport and authenticate.
    async fn connect(&mut self) -> Result<(), AppError>;

    /// Send the subscription request and await its acknowledgement.
    async fn subscribe(&mut self) -> Result<(), AppError>;

    /// Next frame from the active subscription.
    async fn next_frame(&mut self) -> Result<Frame, AppError>;

    /// Release the transport. Called before every reconnect and at shutdown.
    async fn close(&mut self);
}

/// Drive one source through its lifecycle until shutdown:
/// Connecting -> Subscribing -> Active -> Backoff -> Connecting ...
pub async fn run_connector(
    mut source: Box<dyn SourceStream>,
    queue: TxSender,
    counters: Arc<SourceCounters>,
    shutdown: CancellationToken,
) {
    let mut backoff = Backoff::new();

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match establish(source.as_mut(), &shutdown).await {
            Established::Ok => {}
            Established::Shutdown => break,
            Established::Failed { auth } => {
                source.close().await;
                if auth {
                    backoff.note_auth_failure();
                }
                if wait_backoff(&mut backoff, &shutdown).await {
                    break;
                }
                continue;
            }
        }

        backoff.reset();
        counters.reconnects.fetch_add(1, Ordering::Relaxed);
        tracing::info!(target: "connector", source = source.tag(), "Subscription active");

        if read_loop(source.as_mut(), &queue, &counters, &shutdown, &mut backoff).await {
            break;
        }

        source.close().await;
        if wait_backoff(&mut backoff, &shutdown).await {
            break;
        }
    }

    source.close().await;
    tracing::info!(target: "connector", source = source.tag(), "Connector closed");
}

enum Established {
    Ok,
    Failed { auth: bool },
    Shutdown,
}

async fn establish(source: &mut dyn SourceStream, shutdown: &CancellationToken) -> Established {
    let connected = tokio::select! {
        _ = shutdown.cancelled() => return Established::Shutdown,
        res = timeout(CONNECT_TIMEOUT, source.connect()) => res,
    };
    match connected {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let auth = matches!(e, AppError::Auth(_));
            if auth {
                tracing::error!(target: "connector", source = source.tag(), error = %e, "Connect rejected");
            } else {
                tracing::warn!(target: "connector", source = source.tag(), error = %e, "Connect failed");
            }
            return Established::Failed { auth };
        }
        Err(_) => {
            tracing::warn!(target: "connector", source = source.tag(), "Connect timed out");
            return Established::Failed { auth: false };
        }
    }

    let subscribed = tokio::select! {
        _ = shutdown.cancelled() => return Established::Shutdown,
        res = timeout(SUBSCRIBE_TIMEOUT, source.subscribe()) => res,
    };
    match subscribed {
        Ok(Ok(())) => Established::Ok,
        Ok(Err(e)) => {
            let auth = matches!(e, AppError::Auth(_));
            if auth {
                tracing::error!(target: "connector", source = source.tag(), error = %e, "Subscribe rejected");
            } else {
                tracing::warn!(target: "connector", source = source.tag(), error = %e, "Subscribe failed");
            }
            Established::Failed { auth }
        }
        Err(_) => {
            tracing::warn!(target: "connector", source = source.tag(), "Subscribe timed out");
            Established::Failed { auth: false }
        }
    }
}

/// Returns true when the connector should terminate (shutdown), false to
/// re-enter Backoff.
async fn read_loop(
    source: &mut dyn SourceStream,
    queue: &TxSender,
    counters: &Arc<SourceCounters>,
    shutdown: &CancellationToken,
    backoff: &mut Backoff,
) -> bool {
    let mut window_start = Instant::now();
    let mut malformed_in_window: u32 = 0;

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return true,
            res = timeout(READ_IDLE_TIMEOUT, source.next_frame()) => res,
        };

        let frame = match frame {
            Err(_) => {
                tracing::warn!(target: "connector", source = source.tag(), "No traffic for 30s; reconnecting");
                return false;
            }
            Ok(Err(e)) => {
                if matches!(e, AppError::Auth(_)) {
                    tracing::error!(target: "connector", source = source.tag(), error = %e, "Stream rejected credentials");
                    backoff.note_auth_failure();
                } else {
                    tracing::warn!(target: "connector", source = source.tag(), error = %e, "Stream error; reconnecting");
                }
                return false;
            }
            Ok(Ok(frame)) => frame,
        };

        match frame {
            Frame::Heartbeat => {}
            Frame::Malformed(msg) => {
                counters.malformed.fetch_add(1, Ordering::Relaxed);
                if window_start.elapsed() > Duration::from_secs(1) {
                    window_start = Instant::now();
                    malformed_in_window = 0;
                }
                malformed_in_window += 1;
                if malformed_in_window == 1 {
                    tracing::warn!(target: "connector", source = source.tag(), detail = %msg, "Malformed frame dropped");
                } else {
                    tracing::debug!(target: "connector", source = source.tag(), detail = %msg, "Malformed frame dropped");
                }
                if malformed_in_window > MALFORMED_PER_SEC_LIMIT {
                    tracing::warn!(target: "connector", source = source.tag(), "Sustained malformed frames; reconnecting");
                    return false;
                }
            }
            Frame::Hash(hash) => {
                emit(
                    TxObservation::hash_only(source.tag(), hash),
                    queue,
                    counters,
                    source.tag(),
                );
            }
            Frame::Raw(bytes) => {
                emit(
                    TxObservation::raw(source.tag(), bytes),
                    queue,
                    counters,
                    source.tag(),
                );
            }
        }
    }
}

fn emit(obs: TxObservation, queue: &TxSender, counters: &Arc<SourceCounters>, tag: &str) {
    counters.received.fetch_add(1, Ordering::Relaxed);
    if queue.try_push(obs).dropped {
        let dropped = counters.queue_dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped % DROP_WARN_EVERY == 1 {
            tracing::warn!(
                target: "connector",
                source = tag,
                dropped,
                "Inbound queue full; dropping newest observation"
            );
        }
    }
}

async fn wait_backoff(backoff: &mut Backoff, shutdown: &CancellationToken) -> bool {
    let delay = backoff.next_delay();
    tracing::debug!(target: "connector", delay_ms = delay.as_millis() as u64, "Backing off");
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = sleep(delay) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::observation::TxPayload;
    use crate::services::collector::queue::inbound_channel;
    use std::collections::VecDeque;

    struct ScriptedSource {
        frames: VecDeque<Frame>,
    }

    #[async_trait]
    impl SourceStream for ScriptedSource {
        fn tag(&self) -> &str {
            "scripted"
        }

        async fn connect(&mut self) -> Result<(), AppError> {
            Ok(())
        }

        async fn subscribe(&mut self) -> Result<(), AppError> {
            Ok(())
        }

        async fn next_frame(&mut self) -> Result<Frame, AppError> {
            match self.frames.pop_front() {
                Some(frame) => Ok(frame),
                // Block forever once the script is exhausted; the driver's
                // shutdown branch must still win.
                None => {
                    futures::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn scripted_frames_reach_the_queue() {
        let (tx, mut rx) = inbound_channel(16);
        let counters = Arc::new(SourceCounters::default());
        let shutdown = CancellationToken::new();

        let source = Box::new(ScriptedSource {
            frames: VecDeque::from([
                Frame::Hash(B256::from([0xaa; 32])),
                Frame::Heartbeat,
                Frame::Malformed("not json".to_string()),
                Frame::Raw(Bytes::from(vec![0x02, 0x01])),
            ]),
        });

        let driver = tokio::spawn(run_connector(
            source,
            tx,
            counters.clone(),
            shutdown.clone(),
        ));

        let first = rx.recv().await.expect("first observation");
        assert_eq!(first.source, "scripted");
        assert!(matches!(first.payload, TxPayload::Hash(h) if h == B256::from([0xaa; 32])));
        let second = rx.recv().await.expect("second observation");
        assert!(matches!(second.payload, TxPayload::Raw(_)));

        shutdown.cancel();
        driver.await.expect("driver join");

        assert_eq!(counters.received.load(Ordering::Relaxed), 2);
        assert_eq!(counters.malformed.load(Ordering::Relaxed), 1);
        assert_eq!(counters.queue_dropped.load(Ordering::Relaxed), 0);
    }
}
