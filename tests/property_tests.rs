//! Property tests for core invariants
//!
//! Tests for:
//! - Progress fraction bounds (including the zero-total guard)
//! - Idempotent completion stamping under arbitrary progress sequences
//! - Snapshot idempotence in the client registry
//! - Status dedup under arbitrary update sequences

use proptest::prelude::*;

use beamlink_core::{ClientRegistry, LinkStatus, StatusTracker};
use beamlink_files::TransferSession;
use beamlink_integration_tests::{test_client, test_progress};

proptest! {
    #[test]
    fn progress_fraction_is_always_in_unit_interval(
        received in 0u64..=u64::MAX / 2,
        total in 0u64..=u64::MAX / 2,
    ) {
        let p = {
            let mut p = test_progress(1, received, total);
            // Decouple the two counters; test_progress ties them.
            p.received_size = received;
            p.total_size = total;
            p
        };
        let fraction = p.fraction();
        prop_assert!((0.0..=1.0).contains(&fraction));
        if total == 0 {
            prop_assert_eq!(fraction, 0.0);
        }
    }

    #[test]
    fn completion_is_stamped_at_most_once(
        sizes in prop::collection::vec(0u64..=200, 1..32),
    ) {
        let total = 100u64;
        let mut session = TransferSession::from_progress(&test_progress(9, 0, total), 0);

        let mut completions = 0u32;
        let mut first_stamp = None;
        for (tick, received) in sizes.into_iter().enumerate() {
            let now = tick as u64 + 1;
            if session.apply_progress(&test_progress(9, received.min(total), total), now) {
                completions += 1;
                first_stamp = first_stamp.or(Some(now));
            }
        }

        prop_assert!(completions <= 1);
        if completions == 1 {
            prop_assert_eq!(session.finish_ms, first_stamp);
            prop_assert!(session.is_complete());
        }
    }

    #[test]
    fn registry_snapshot_reapplication_never_changes(
        ids in prop::collection::vec("[a-f]{1,4}", 0..8),
    ) {
        let mut registry = ClientRegistry::new();
        let list: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| test_client(id, (i % 250) as u8 + 1))
            .collect();

        registry.apply_full_snapshot(list.clone());
        // Re-applying the exact snapshot is never a change.
        prop_assert!(!registry.apply_full_snapshot(list));
    }

    #[test]
    fn status_stream_has_no_consecutive_duplicates(
        codes in prop::collection::vec(prop_oneof![
            Just(1u8), Just(2), Just(3), Just(4), Just(5), Just(6), Just(7), Just(8), Just(99)
        ], 0..64),
    ) {
        let mut tracker = StatusTracker::new();
        let emitted: Vec<LinkStatus> = codes
            .into_iter()
            .filter_map(LinkStatus::from_code)
            .filter_map(|s| tracker.observe(s))
            .collect();
        for pair in emitted.windows(2) {
            prop_assert_ne!(pair[0], pair[1]);
        }
    }
}
