// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use crate::domain::observation::TxSummary;
use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{B256, Bytes, keccak256};

/// Decode a raw transaction envelope into its canonical hash and summary
/// fields. Fails on malformed envelopes and on signatures the sender cannot
/// be recovered from.
pub fn decode(raw: &Bytes) -> Result<TxSummary, AppError> {
    let mut slice = raw.as_ref();
    let envelope = TxEnvelope::decode_2718(&mut slice)
        .map_err(|e| AppError::Decode(format!("invalid envelope: {e}")))?;

    let from = envelope
        .recover_signer()
        .map_err(|e| AppError::Decode(format!("signer recovery failed: {e}")))?;

    let signature = envelope.signature();
    let gas_price = envelope.gas_price();
    // max_fee_per_gas falls back to the gas price for pre-1559 envelopes;
    // only report it as a fee cap for dynamic-fee transactions.
    let gas_fee_cap = if gas_price.is_some() {
        None
    } else {
        Some(envelope.max_fee_per_gas())
    };

    Ok(TxSummary {
        hash: *envelope.tx_hash(),
        tx_type: envelope.tx_type() as u8,
        chain_id: envelope.chain_id(),
        from,
        to: envelope.to(),
        value: envelope.value(),
        nonce: envelope.nonce(),
        gas_limit: envelope.gas_limit(),
        gas_price,
        gas_tip_cap: envelope.max_priority_fee_per_gas(),
        gas_fee_cap,
        data_size: envelope.input().len(),
        v: signature.v() as u8,
        r: signature.r(),
        s: signature.s(),
        raw: raw.clone(),
    })
}

/// Canonical hash of an envelope that failed full decoding. The tx hash is
/// the keccak of the exact envelope bytes, so a sighting can still be logged.
pub fn envelope_hash(raw: &[u8]) -> B256 {
    keccak256(raw)
}
