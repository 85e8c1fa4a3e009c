// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use mempool_scribe::common::alias::SourceAliasTable;
use mempool_scribe::common::stats::CollectorStats;
use mempool_scribe::domain::observation::{TxObservation, TxPayload};
use mempool_scribe::services::collector::dedup::DedupIndex;
use mempool_scribe::services::collector::processor::Processor;
use mempool_scribe::services::collector::queue::{TxSender, inbound_channel};
use mempool_scribe::services::collector::writer::OutputWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const UID: &str = "test01";

fn signed_raw_tx(nonce: u64) -> Bytes {
    let signer = PrivateKeySigner::random();
    let mut tx = TxEip1559 {
        chain_id: 1,
        nonce,
        gas_limit: 21_000,
        max_fee_per_gas: 2_000_000_000,
        max_priority_fee_per_gas: 1_000_000_000,
        to: TxKind::Call(Address::from([0x42; 20])),
        value: U256::from(1u64),
        access_list: Default::default(),
        input: Bytes::new(),
    };
    let sig = signer.sign_transaction_sync(&mut tx).expect("sign");
    let envelope: TxEnvelope = tx.into_signed(sig).into();
    let mut out = Vec::new();
    envelope.encode_2718(&mut out);
    Bytes::from(out)
}

fn obs(source: &str, ts_ms: u64, payload: TxPayload) -> TxObservation {
    TxObservation {
        received_at_ms: ts_ms,
        source: source.to_string(),
        payload,
    }
}

/// Spawn a processor over a fresh channel, feed it through `feed`, close the
/// channel, and wait for the drain to finish.
async fn run_pipeline(
    dir: &Path,
    aliases: SourceAliasTable,
    capacity: usize,
    feed: impl FnOnce(&TxSender),
) -> Arc<CollectorStats> {
    let stats = Arc::new(CollectorStats::default());
    let (tx, rx) = inbound_channel(capacity);
    let writer = OutputWriter::new(dir, UID, stats.clone()).expect("writer");
    let processor = Processor::new(
        rx,
        writer,
        DedupIndex::new(Duration::from_secs(3600)),
        aliases,
        None,
        stats.clone(),
    );

    feed(&tx);
    drop(tx);
    processor.run().await.expect("processor run");
    stats
}

fn read_rows(dir: &Path, kind: &str, day: &str) -> Vec<String> {
    let path = dir.join(format!("{UID}_{kind}-{day}.csv"));
    let body = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("read {}: {e}", path.display()));
    body.lines().skip(1).map(ToString::to_string).collect()
}

#[tokio::test]
async fn first_seen_goes_to_the_earliest_source() {
    let dir = tempfile::tempdir().unwrap();
    let raw = signed_raw_tx(7);

    run_pipeline(dir.path(), SourceAliasTable::default(), 1024, |tx| {
        assert!(!tx.try_push(obs("A", 1000, TxPayload::Raw(raw.clone()))).dropped);
        assert!(!tx.try_push(obs("B", 1050, TxPayload::Raw(raw.clone()))).dropped);
    })
    .await;

    let sightings = read_rows(dir.path(), "sourcelog", "1970-01-01");
    assert_eq!(sightings.len(), 2);
    assert!(sightings[0].starts_with("1000,"));
    assert!(sightings[0].ends_with(",A"));
    assert!(sightings[1].starts_with("1050,"));
    assert!(sightings[1].ends_with(",B"));
    // Both rows carry the same hash
    let hash_a = sightings[0].split(',').nth(1).unwrap();
    let hash_b = sightings[1].split(',').nth(1).unwrap();
    assert_eq!(hash_a, hash_b);

    let transactions = read_rows(dir.path(), "transactions", "1970-01-01");
    assert_eq!(transactions.len(), 1);
    assert!(transactions[0].starts_with("1000,"));
    assert!(transactions[0].contains(hash_a));
}

#[tokio::test]
async fn every_sighting_is_logged_after_alias_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let aliases = SourceAliasTable::with_entries([(
        "ws://10.0.0.1:8546".to_string(),
        "local-node".to_string(),
    )]);

    run_pipeline(dir.path(), aliases, 1024, |tx| {
        tx.try_push(obs(
            "ws://10.0.0.1:8546",
            2000,
            TxPayload::Hash(B256::from([0xaa; 32])),
        ));
        tx.try_push(obs(
            "unmapped",
            2001,
            TxPayload::Hash(B256::from([0xbb; 32])),
        ));
    })
    .await;

    let sightings = read_rows(dir.path(), "sourcelog", "1970-01-01");
    assert_eq!(sightings.len(), 2);
    assert!(sightings[0].ends_with(",local-node"));
    assert!(sightings[1].ends_with(",unmapped"));
}

#[tokio::test]
async fn hash_only_first_seen_writes_no_summary_row() {
    let dir = tempfile::tempdir().unwrap();

    run_pipeline(dir.path(), SourceAliasTable::default(), 1024, |tx| {
        tx.try_push(obs("A", 3000, TxPayload::Hash(B256::from([0xcc; 32]))));
        tx.try_push(obs("B", 3001, TxPayload::Hash(B256::from([0xcc; 32]))));
    })
    .await;

    let sightings = read_rows(dir.path(), "sourcelog", "1970-01-01");
    assert_eq!(sightings.len(), 2);
    assert!(
        !dir.path()
            .join(format!("{UID}_transactions-1970-01-01.csv"))
            .exists()
    );
}

#[tokio::test]
async fn undecodable_envelope_keeps_its_sighting() {
    let dir = tempfile::tempdir().unwrap();
    let garbage = Bytes::from(vec![0xfe, 0xed, 0xfa, 0xce]);

    let stats = run_pipeline(dir.path(), SourceAliasTable::default(), 1024, |tx| {
        tx.try_push(obs("A", 4000, TxPayload::Raw(garbage.clone())));
    })
    .await;

    let sightings = read_rows(dir.path(), "sourcelog", "1970-01-01");
    assert_eq!(sightings.len(), 1);
    assert!(sightings[0].starts_with("4000,0x"));
    assert!(
        !dir.path()
            .join(format!("{UID}_transactions-1970-01-01.csv"))
            .exists()
    );
    assert_eq!(
        stats
            .decode_failed
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn queued_observations_are_written_before_exit() {
    let dir = tempfile::tempdir().unwrap();

    run_pipeline(dir.path(), SourceAliasTable::default(), 1024, |tx| {
        for i in 0..500u64 {
            let mut marker = [0u8; 32];
            marker[..8].copy_from_slice(&i.to_be_bytes());
            assert!(
                !tx.try_push(obs("A", 5000 + i, TxPayload::Hash(B256::from(marker))))
                    .dropped
            );
        }
    })
    .await;

    let sightings = read_rows(dir.path(), "sourcelog", "1970-01-01");
    assert_eq!(sightings.len(), 500);
}

#[tokio::test]
async fn overflow_drops_newest_and_conserves_counts() {
    let dir = tempfile::tempdir().unwrap();
    const CAPACITY: usize = 100;
    const EMITTED: u64 = 250;

    let stats = Arc::new(CollectorStats::default());
    let (tx, rx) = inbound_channel(CAPACITY);

    // Stalled processor: emit everything before the drain starts.
    let mut dropped = 0u64;
    for i in 0..EMITTED {
        let mut marker = [0u8; 32];
        marker[..8].copy_from_slice(&i.to_be_bytes());
        if tx
            .try_push(obs("A", 6000 + i, TxPayload::Hash(B256::from(marker))))
            .dropped
        {
            dropped += 1;
        }
    }
    drop(tx);
    assert_eq!(dropped, EMITTED - CAPACITY as u64);

    let writer = OutputWriter::new(dir.path(), UID, stats.clone()).expect("writer");
    let processor = Processor::new(
        rx,
        writer,
        DedupIndex::new(Duration::from_secs(3600)),
        SourceAliasTable::default(),
        None,
        stats,
    );
    processor.run().await.expect("processor run");

    let sightings = read_rows(dir.path(), "sourcelog", "1970-01-01");
    assert_eq!(sightings.len() as u64 + dropped, EMITTED);
    // The survivors are the oldest 100, in FIFO order
    assert!(sightings[0].starts_with("6000,"));
    assert!(sightings[CAPACITY - 1].starts_with(&format!("{},", 6000 + CAPACITY as u64 - 1)));
}
