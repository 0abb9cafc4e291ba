//! Property tests for epoch arithmetic, hashing and batch membership.

use chrono::{DateTime, Utc};
use proptest::prelude::*;

use epitrace::adapters::BloomFilter;
use epitrace::domain::epoch::epoch_start_time;
use epitrace::domain::{
    ephid_from_seed, epoch_from_time, hashed_observation_from_ephid, hashed_observation_from_seed,
    EPOCH_LENGTH,
};
use epitrace::{Epoch, Seed, TracingBatch};

fn timestamp() -> impl Strategy<Value = i64> {
    -10_000_000_000i64..10_000_000_000
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("Timestamp in range")
}

#[test]
fn epoch_is_monotonic() {
    proptest!(|(a in timestamp(), b in timestamp())| {
        let (t1, t2) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(epoch_from_time(at(t1)) <= epoch_from_time(at(t2)));
    });
}

#[test]
fn epoch_steps_every_epoch_length() {
    proptest!(|(t in timestamp())| {
        let epoch = epoch_from_time(at(t));
        prop_assert_eq!(epoch_from_time(at(t + EPOCH_LENGTH)), epoch + 1);

        let start = epoch_start_time(epoch).expect("Epoch in range");
        prop_assert!(start <= at(t));
        prop_assert!(at(t) < start + chrono::Duration::seconds(EPOCH_LENGTH));
    });
}

#[test]
fn seed_and_identifier_hashes_agree() {
    proptest!(|(bytes in any::<[u8; 32]>(), epoch in any::<Epoch>())| {
        let seed = Seed::from_bytes(bytes);
        prop_assert_eq!(
            hashed_observation_from_ephid(&ephid_from_seed(&seed), epoch),
            hashed_observation_from_seed(&seed, epoch)
        );
    });
}

#[test]
fn batch_has_no_false_negatives() {
    let pairs = prop::collection::vec((any::<Epoch>(), any::<[u8; 32]>()), 0..64);
    proptest!(|(raw in pairs)| {
        let reported: Vec<(Epoch, Seed)> = raw
            .into_iter()
            .map(|(epoch, bytes)| (epoch, Seed::from_bytes(bytes)))
            .collect();
        let batch: TracingBatch<BloomFilter> = TracingBatch::from_epoch_seeds(
            reported.len() as u64,
            reported.iter().map(|(e, s)| (*e, s)),
        )
        .expect("Should build");

        let restored: TracingBatch<BloomFilter> =
            TracingBatch::from_bytes(&batch.to_bytes()).expect("Should parse");
        for (epoch, seed) in &reported {
            let hash = hashed_observation_from_seed(seed, *epoch);
            prop_assert!(batch.contains(&hash));
            prop_assert!(restored.contains(&hash));
        }
    });
}
