//! Concurrency properties of the health table
//!
//! Bumps arrive on the transport's event loop while sweeps run on the control
//! loop. These tests hammer the table from multiple threads and check that
//! the bookkeeping invariants hold no matter how the calls interleave.

use chrono::{DateTime, Duration, TimeZone, Utc};
use doorwatch::health::{ClientHealthTable, HealthState};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap()
}

#[test]
fn test_concurrent_bumps_and_sweeps_keep_table_consistent() {
    let table = Arc::new(ClientHealthTable::new(Duration::minutes(5)));
    let mut handles = Vec::new();

    // 8 bump threads across 4 distinct client ids
    for worker in 0..8 {
        let table = table.clone();
        handles.push(thread::spawn(move || {
            let client_id = format!("dev{}", worker % 4);
            for i in 0..500 {
                table.bump(&client_id, t0() + Duration::seconds(i));
            }
        }));
    }

    // 2 sweep threads running concurrently with the bumps
    for _ in 0..2 {
        let table = table.clone();
        handles.push(thread::spawn(move || {
            for i in 0..200 {
                let transitions = table.sweep(t0() + Duration::seconds(i));
                for transition in transitions {
                    // A sweep may only declare a record unhealthy once its
                    // deadline has passed at observation time
                    if transition.to == HealthState::Unhealthy {
                        assert!(transition.observed_at >= transition.unhealthy_after);
                    } else {
                        assert!(transition.unhealthy_after > transition.observed_at);
                    }
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("no thread may panic");
    }

    // Final state is internally consistent
    let snapshot = table.snapshot();
    assert_eq!(snapshot.len(), 4);
    for record in snapshot.values() {
        assert_eq!(record.unhealthy_after, record.last_seen + Duration::minutes(5));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Interleaved bumps and sweeps never break the deadline invariant, and
    /// a sweep never flips a record whose deadline is still in the future.
    #[test]
    fn prop_interleaved_bumps_and_sweeps(
        bump_offsets in prop::collection::vec((0usize..6, 0i64..600), 1..64),
        sweep_offsets in prop::collection::vec(0i64..600, 1..16),
    ) {
        let table = Arc::new(ClientHealthTable::new(Duration::minutes(5)));

        let bumper = {
            let table = table.clone();
            thread::spawn(move || {
                for (client, offset) in bump_offsets {
                    table.bump(&format!("dev{client}"), t0() + Duration::seconds(offset));
                }
            })
        };
        let sweeper = {
            let table = table.clone();
            thread::spawn(move || {
                let mut all = Vec::new();
                for offset in sweep_offsets {
                    all.extend(table.sweep(t0() + Duration::seconds(offset)));
                }
                all
            })
        };

        bumper.join().expect("bump thread panicked");
        let transitions = sweeper.join().expect("sweep thread panicked");

        for transition in transitions {
            match transition.to {
                HealthState::Unhealthy => {
                    prop_assert!(transition.observed_at >= transition.unhealthy_after);
                }
                HealthState::Healthy => {
                    prop_assert!(transition.unhealthy_after > transition.observed_at);
                }
            }
        }

        for record in table.snapshot().values() {
            prop_assert_eq!(
                record.unhealthy_after,
                record.last_seen + Duration::minutes(5)
            );
        }
    }
}
