// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::primitives::{Address, B256, Bytes, U256};
use std::time::{SystemTime, UNIX_EPOCH};

/// What a source actually delivered: just the hash, or the full envelope.
#[derive(Debug, Clone)]
pub enum TxPayload {
    Hash(B256),
    Raw(Bytes),
}

/// One delivery of a transaction from one source at one point in time.
///
/// `received_at_ms` is stamped when the bytes cross the process boundary and
/// never mutated downstream.
#[derive(Debug, Clone)]
pub struct TxObservation {
    pub received_at_ms: u64,
    pub source: String,
    pub payload: TxPayload,
}

impl TxObservation {
    pub fn hash_only(source: &str, hash: B256) -> Self {
        Self {
            received_at_ms: now_millis(),
            source: source.to_string(),
            payload: TxPayload::Hash(hash),
        }
    }

    pub fn raw(source: &str, bytes: Bytes) -> Self {
        Self {
            received_at_ms: now_millis(),
            source: source.to_string(),
            payload: TxPayload::Raw(bytes),
        }
    }
}

/// Decoded transaction fields, available when the full envelope was delivered.
#[derive(Debug, Clone)]
pub struct TxSummary {
    pub hash: B256,
    pub tx_type: u8,
    pub chain_id: Option<u64>,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: Option<u128>,
    pub gas_tip_cap: Option<u128>,
    pub gas_fee_cap: Option<u128>,
    pub data_size: usize,
    pub v: u8,
    pub r: U256,
    pub s: U256,
    pub raw: Bytes,
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
