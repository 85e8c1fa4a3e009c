// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::stats::CollectorStats;
use crate::domain::error::AppError;
use crate::domain::observation::TxSummary;
use crate::services::collector::rotate::RotatingCsv;
use alloy::primitives::B256;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

pub const SOURCELOG_HEADER: &str = "timestamp_ms,hash,source";
pub const TRANSACTIONS_HEADER: &str = "timestamp_ms,hash,chainId,from,to,value,nonce,gas,gasPrice,gasTipCap,gasFeeCap,dataSize,type,v,r,s,rawTx";

/// Owns the two observation logs: every sighting goes to the sourcelog,
/// first-seen summaries go to the transactions log.
pub struct OutputWriter {
    sourcelog: RotatingCsv,
    transactions: RotatingCsv,
    stats: Arc<CollectorStats>,
}

impl OutputWriter {
    pub fn new(out_dir: &Path, uid: &str, stats: Arc<CollectorStats>) -> Result<Self, AppError> {
        std::fs::create_dir_all(out_dir)?;
        Ok(Self {
            sourcelog: RotatingCsv::new(out_dir, uid, "sourcelog", SOURCELOG_HEADER),
            transactions: RotatingCsv::new(out_dir, uid, "transactions", TRANSACTIONS_HEADER),
            stats,
        })
    }

    pub fn record_sighting(&mut self, ts_ms: u64, hash: B256, source: &str) {
        let row = format!("{ts_ms},{hash},{source}");
        if !self.sourcelog.append(ts_ms, &row) {
            self.stats.writer_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_first_seen(&mut self, ts_ms: u64, summary: &TxSummary) {
        let row = format_summary_row(ts_ms, summary);
        if !self.transactions.append(ts_ms, &row) {
            self.stats.writer_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn flush(&mut self) {
        self.sourcelog.flush();
        self.transactions.flush();
    }
}

fn format_summary_row(ts_ms: u64, s: &TxSummary) -> String {
    format!(
        "{ts},{hash},{chain},{from},{to},{value},{nonce},{gas},{gas_price},{tip},{fee},{data},{ty},{v},{r:#x},{sg:#x},{raw}",
        ts = ts_ms,
        hash = s.hash,
        chain = opt(s.chain_id),
        from = s.from,
        to = s.to.map(|a| a.to_string()).unwrap_or_default(),
        value = s.value,
        nonce = s.nonce,
        gas = s.gas_limit,
        gas_price = opt(s.gas_price),
        tip = opt(s.gas_tip_cap),
        fee = opt(s.gas_fee_cap),
        data = s.data_size,
        ty = s.tx_type,
        v = s.v,
        r = s.r,
        sg = s.s,
        raw = s.raw,
    )
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
