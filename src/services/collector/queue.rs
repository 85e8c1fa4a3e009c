// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::observation::TxObservation;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[derive(Clone, Copy, Debug)]
pub struct PushResult {
    pub dropped: bool,
}

/// Producer half of the shared inbound channel. Pushes never block: when the
/// processor falls behind, the newest observation is dropped so connectors
/// keep draining their sockets.
#[derive(Clone)]
pub struct TxSender {
    tx: mpsc::Sender<TxObservation>,
}

pub fn inbound_channel(capacity: usize) -> (TxSender, mpsc::Receiver<TxObservation>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (TxSender { tx }, rx)
}

impl TxSender {
    pub fn try_push(&self, obs: TxObservation) -> PushResult {
        match self.tx.try_send(obs) {
            Ok(()) => PushResult { dropped: false },
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                PushResult { dropped: true }
            }
        }
    }
}
