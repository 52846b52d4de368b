//! Property-based tests for the storage layer.
//!
//! These tests verify the reachability, ordering, and batch-atomicity
//! invariants over randomized op sequences, sequentially (where the
//! exact outcome is computable) and under real threads (where only the
//! invariants are).

#![allow(clippy::pedantic)]
#![expect(clippy::unwrap_used)]

use objfactory::Storage;
use proptest::prelude::*;
use std::sync::Barrier;
use std::thread;

// ============================================================================
//  Strategies
// ============================================================================

/// One producer step: insert the next value, or publish the pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Insert,
    Publish,
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![3 => Just(Op::Insert), 1 => Just(Op::Publish)],
        0..40,
    )
}

/// Split an op list into the batches its publishes would form, tagging
/// inserts with `tag(seq)`. The trailing remainder is the final batch
/// (producers publish on drop).
fn batches_of(ops: &[Op], tag: impl Fn(u64) -> u64) -> Vec<Vec<u64>> {
    let mut batches = Vec::new();
    let mut pending = Vec::new();
    let mut seq: u64 = 0;
    for op in ops {
        match op {
            Op::Insert => {
                pending.push(tag(seq));
                seq += 1;
            }
            Op::Publish => {
                if !pending.is_empty() {
                    batches.push(std::mem::take(&mut pending));
                }
            }
        }
    }
    if !pending.is_empty() {
        batches.push(pending);
    }
    batches
}

fn collect_u64(storage: &Storage<8>) -> Vec<u64> {
    let mut iter = storage.iter();
    let mut out = Vec::new();
    while let Some(node) = iter.current() {
        // SAFETY: these tests only insert u64 payloads.
        out.push(unsafe { *node.data_ref::<u64>() });
        iter.advance();
    }
    out
}

// ============================================================================
//  Sequential properties (exact outcome computable)
// ============================================================================

proptest! {
    /// A single producer's published list is exactly its batches,
    /// concatenated in publish order.
    #[test]
    fn sequential_publishes_match_the_model(ops in ops()) {
        let storage: Storage<8> = Storage::new();
        let mut producer = storage.producer();

        let mut seq: u64 = 0;
        for op in &ops {
            match op {
                Op::Insert => {
                    producer.insert(seq).unwrap();
                    seq += 1;
                }
                Op::Publish => producer.publish(),
            }
        }
        drop(producer);

        let expected: Vec<u64> = batches_of(&ops, |s| s).into_iter().flatten().collect();
        prop_assert_eq!(collect_u64(&storage), expected);
    }

    /// Erasing an arbitrary subset leaves exactly the survivors, in order.
    #[test]
    fn erase_subset_keeps_survivors_in_order(
        count in 1_u64..60,
        splits in prop::collection::vec(any::<bool>(), 60),
        erase in prop::collection::vec(any::<bool>(), 60),
    ) {
        let storage: Storage<8> = Storage::new();
        let mut producer = storage.producer();
        for v in 0..count {
            producer.insert(v).unwrap();
            if splits[v as usize] {
                producer.publish();
            }
        }
        drop(producer);

        {
            let mut iter = storage.iter();
            while let Some(node) = iter.current() {
                // SAFETY: only u64 payloads are inserted here.
                let value = unsafe { *node.data_ref::<u64>() };
                if erase[value as usize] {
                    iter.erase_and_advance();
                } else {
                    iter.advance();
                }
            }
        }

        let expected: Vec<u64> = (0..count).filter(|v| !erase[*v as usize]).collect();
        prop_assert_eq!(collect_u64(&storage), expected);
        prop_assert_eq!(storage.len_approx(), (count as usize) - erase[..count as usize]
            .iter()
            .filter(|e| **e)
            .count());
    }

    /// Raw payloads of arbitrary sizes come back aligned and intact.
    #[test]
    fn payloads_are_aligned_and_stable(sizes in prop::collection::vec(0_usize..200, 1..30)) {
        let storage: Storage<16> = Storage::new();
        let mut producer = storage.producer();

        for (i, &size) in sizes.iter().enumerate() {
            let payload = producer.insert_bytes(size).unwrap();
            prop_assert_eq!(payload.as_ptr() as usize % 16, 0);
            // SAFETY: `size` writable bytes.
            unsafe {
                for b in 0..size {
                    payload.add(b).write(i as u8);
                }
            }
        }
        producer.publish();

        let mut iter = storage.iter();
        let mut index = 0;
        while let Some(node) = iter.current() {
            prop_assert_eq!(node.payload_size(), sizes[index]);
            prop_assert_eq!(node.data().as_ptr() as usize % 16, 0);
            // SAFETY: payload was filled with `index as u8` above.
            unsafe {
                for b in 0..sizes[index] {
                    prop_assert_eq!(node.data().add(b).read(), index as u8);
                }
            }
            index += 1;
            iter.advance();
        }
        prop_assert_eq!(index, sizes.len());
    }
}

// ============================================================================
//  Concurrent properties (invariants only)
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Under real threads: every node survives exactly once, each
    /// producer keeps its insert order, and batches never interleave.
    #[test]
    fn concurrent_publishes_respect_order_and_atomicity(
        per_thread in prop::collection::vec(ops(), 2..5),
    ) {
        let storage: Storage<8> = Storage::new();
        let barrier = Barrier::new(per_thread.len());

        thread::scope(|s| {
            for (t, ops) in per_thread.iter().enumerate() {
                let storage = &storage;
                let barrier = &barrier;
                s.spawn(move || {
                    let mut producer = storage.producer();
                    barrier.wait();
                    let mut seq: u64 = 0;
                    for op in ops {
                        match op {
                            Op::Insert => {
                                producer.insert(((t as u64) << 32) | seq).unwrap();
                                seq += 1;
                            }
                            Op::Publish => producer.publish(),
                        }
                    }
                });
            }
        });

        let values = collect_u64(&storage);

        // Every insert is reachable exactly once.
        let total: usize = per_thread
            .iter()
            .map(|ops| ops.iter().filter(|op| **op == Op::Insert).count())
            .sum();
        prop_assert_eq!(values.len(), total);

        for (t, ops) in per_thread.iter().enumerate() {
            // Per-producer insert order survives.
            let seqs: Vec<u64> = values
                .iter()
                .filter(|v| (*v >> 32) as usize == t)
                .map(|v| v & 0xFFFF_FFFF)
                .collect();
            let insert_count = ops.iter().filter(|op| **op == Op::Insert).count() as u64;
            let expected: Vec<u64> = (0..insert_count).collect();
            prop_assert_eq!(&seqs, &expected, "thread {} out of order", t);

            // Each batch appears contiguously in the global list.
            for batch in batches_of(ops, |s| ((t as u64) << 32) | s) {
                let start = values
                    .iter()
                    .position(|v| *v == batch[0])
                    .expect("batch head missing");
                prop_assert_eq!(
                    &values[start..start + batch.len()],
                    &batch[..],
                    "batch of thread {} interleaved",
                    t
                );
            }
        }
    }
}
