//! Engine benchmark binary.
//!
//! Drives the full block lifecycle end to end - transfers, deployments
//! and contract invocations - and reports throughput per phase.
//! Run with: `cargo run --release --bin bench`

use std::time::Instant;

use appchain::contract::registry::ContractRegistry;
use appchain::core::block::BlockHeader;
use appchain::core::transaction::{Transaction, TxPayload};
use appchain::core::worker::Worker;
use appchain::crypto::key_pair::PrivateKey;
use appchain::state::value::Value;
use appchain::types::address::Address;
use appchain::types::encoding::Encode;
use appchain::types::hash::Hash;

const BLOCKS: u64 = 50;
const TRANSFERS_PER_BLOCK: u64 = 200;

fn header(number: u64) -> BlockHeader {
    BlockHeader {
        number,
        hash: Hash::sha3()
            .chain(b"BENCH_BLOCK")
            .chain(&number.to_le_bytes())
            .finalize(),
        timestamp: 1_700_000_000 + number,
    }
}

fn run_block(worker: &Worker, number: u64, raw_txs: &[Vec<u8>]) -> Hash {
    worker.begin_block(header(number)).expect("begin_block");
    for raw in raw_txs {
        worker.apply(raw).expect("apply");
    }
    worker.end_block().expect("end_block");
    worker.commit().expect("commit")
}

fn main() {
    let key = PrivateKey::new();
    let sender = key.public_key().address();
    let worker = Worker::new(&[(sender, u128::MAX / 2)]);

    // Transfers ------------------------------------------------------------
    let mut nonce = 0u64;
    let started = Instant::now();
    for number in 1..=BLOCKS {
        let raw_txs: Vec<Vec<u8>> = (0..TRANSFERS_PER_BLOCK)
            .map(|i| {
                let to = Address([(i % 251) as u8 + 1; 20]);
                let tx = Transaction::new(Some(to), 1, 1, TxPayload::Transfer, nonce, &key);
                nonce += 1;
                tx.to_bytes()
            })
            .collect();
        run_block(&worker, number, &raw_txs);
    }
    let elapsed = started.elapsed();
    let total = BLOCKS * TRANSFERS_PER_BLOCK;
    println!(
        "transfers: {total} txs in {elapsed:?} ({:.0} tx/s)",
        total as f64 / elapsed.as_secs_f64()
    );

    // Contract deploy + invokes --------------------------------------------
    let started = Instant::now();
    let deploy = Transaction::new(
        None,
        0,
        1,
        TxPayload::Deploy {
            code: "counter".to_string(),
            params: vec![],
        },
        nonce,
        &key,
    );
    let contract = ContractRegistry::derive_address(sender, nonce);
    nonce += 1;

    let mut raw_txs = vec![deploy.to_bytes()];
    for _ in 0..TRANSFERS_PER_BLOCK {
        let tx = Transaction::new(
            Some(contract),
            0,
            1,
            TxPayload::Invoke {
                name: "increase".to_string(),
                params: vec![Value::Int(1)],
            },
            nonce,
            &key,
        );
        nonce += 1;
        raw_txs.push(tx.to_bytes());
    }
    let digest = run_block(&worker, BLOCKS + 1, &raw_txs);
    let elapsed = started.elapsed();
    println!(
        "invokes: {} txs in {elapsed:?} ({:.0} tx/s)",
        raw_txs.len(),
        raw_txs.len() as f64 / elapsed.as_secs_f64()
    );

    println!(
        "final: height={} count={:?} digest={digest}",
        worker.info().last_block_number,
        worker.contract_state(contract, "count"),
    );
}
