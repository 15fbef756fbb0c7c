//! Per-device liveness bookkeeping
//!
//! Every message from a controller bumps its `last_seen` timestamp; a
//! periodic sweep is the only place the healthy/unhealthy state flips. The
//! deadline-based hysteresis means a device only goes unhealthy once its
//! deadline has passed at sweep time, and only recovers once a bump has
//! pushed the deadline back into the future.
//!
//! Bumps arrive from the transport's event loop while sweeps run on the
//! control loop, so the table lives behind a mutex.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Liveness state of one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Liveness record for one controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHealth {
    pub last_seen: DateTime<Utc>,
    pub state: HealthState,
    pub unhealthy_after: DateTime<Utc>,
}

/// A state flip observed by a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTransition {
    pub client_id: String,
    pub from: HealthState,
    pub to: HealthState,
    pub last_seen: DateTime<Utc>,
    pub unhealthy_after: DateTime<Utc>,
    pub observed_at: DateTime<Utc>,
}

/// Device id → liveness record, guarded for concurrent bump/sweep
pub struct ClientHealthTable {
    unhealthy_duration: Duration,
    clients: Mutex<HashMap<String, ClientHealth>>,
}

impl ClientHealthTable {
    pub fn new(unhealthy_duration: Duration) -> Self {
        Self {
            unhealthy_duration,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Record that a message from `client_id` arrived at `now`. Creates the
    /// record on first sight; otherwise refreshes the timestamps. Never
    /// touches `state` — that is the sweep's job.
    pub fn bump(&self, client_id: &str, now: DateTime<Utc>) {
        let unhealthy_after = now + self.unhealthy_duration;
        let mut clients = self.clients.lock().expect("health table lock poisoned");
        match clients.get_mut(client_id) {
            Some(record) => {
                record.last_seen = now;
                record.unhealthy_after = unhealthy_after;
            }
            None => {
                clients.insert(
                    client_id.to_string(),
                    ClientHealth {
                        last_seen: now,
                        state: HealthState::Healthy,
                        unhealthy_after,
                    },
                );
            }
        }
    }

    /// Evaluate every record against `now` and flip states whose deadline
    /// verdict changed. Returns the transitions so the caller can log them.
    /// Iteration order is unspecified.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<HealthTransition> {
        let mut transitions = Vec::new();
        let mut clients = self.clients.lock().expect("health table lock poisoned");
        for (client_id, record) in clients.iter_mut() {
            let next = match record.state {
                HealthState::Healthy if now >= record.unhealthy_after => HealthState::Unhealthy,
                HealthState::Unhealthy if record.unhealthy_after > now => HealthState::Healthy,
                current => current,
            };
            if next != record.state {
                transitions.push(HealthTransition {
                    client_id: client_id.clone(),
                    from: record.state,
                    to: next,
                    last_seen: record.last_seen,
                    unhealthy_after: record.unhealthy_after,
                    observed_at: now,
                });
                record.state = next;
            }
        }
        transitions
    }

    /// Copy of the current table, for logging and tests
    pub fn snapshot(&self) -> HashMap<String, ClientHealth> {
        self.clients
            .lock()
            .expect("health table lock poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.clients
            .lock()
            .expect("health table lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn minutes(m: i64) -> Duration {
        Duration::minutes(m)
    }

    fn table() -> ClientHealthTable {
        ClientHealthTable::new(minutes(5))
    }

    #[test]
    fn test_bump_creates_healthy_record() {
        let table = table();
        table.bump("dev1", t0());

        let snapshot = table.snapshot();
        let record = &snapshot["dev1"];
        assert_eq!(record.state, HealthState::Healthy);
        assert_eq!(record.last_seen, t0());
        assert_eq!(record.unhealthy_after, t0() + minutes(5));
    }

    #[test]
    fn test_bump_maintains_deadline_invariant() {
        let table = table();
        for m in 0..10 {
            let now = t0() + minutes(m);
            table.bump("dev1", now);
            let record = table.snapshot()["dev1"].clone();
            assert_eq!(record.unhealthy_after, record.last_seen + minutes(5));
        }
    }

    #[test]
    fn test_bump_does_not_flip_state() {
        let table = table();
        table.bump("dev1", t0());

        // Let the record go unhealthy
        let transitions = table.sweep(t0() + minutes(6));
        assert_eq!(transitions.len(), 1);
        assert_eq!(table.snapshot()["dev1"].state, HealthState::Unhealthy);

        // A bump refreshes the deadline but the state flip waits for a sweep
        table.bump("dev1", t0() + minutes(7));
        assert_eq!(table.snapshot()["dev1"].state, HealthState::Unhealthy);
    }

    #[test]
    fn test_sweep_before_deadline_leaves_record_healthy() {
        let table = table();
        table.bump("A", t0());

        let transitions = table.sweep(t0() + minutes(4));
        assert!(transitions.is_empty());
        assert_eq!(table.snapshot()["A"].state, HealthState::Healthy);
    }

    #[test]
    fn test_sweep_after_deadline_emits_one_transition() {
        let table = table();
        table.bump("A", t0());

        let transitions = table.sweep(t0() + minutes(6));
        assert_eq!(transitions.len(), 1);
        let transition = &transitions[0];
        assert_eq!(transition.client_id, "A");
        assert_eq!(transition.from, HealthState::Healthy);
        assert_eq!(transition.to, HealthState::Unhealthy);
        assert_eq!(transition.last_seen, t0());
        assert_eq!(transition.unhealthy_after, t0() + minutes(5));
        assert_eq!(transition.observed_at, t0() + minutes(6));

        // A second sweep does not re-emit
        assert!(table.sweep(t0() + minutes(7)).is_empty());
        assert_eq!(table.snapshot()["A"].state, HealthState::Unhealthy);
    }

    #[test]
    fn test_sweep_exactly_at_deadline_transitions() {
        let table = table();
        table.bump("A", t0());

        let transitions = table.sweep(t0() + minutes(5));
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to, HealthState::Unhealthy);
    }

    #[test]
    fn test_recovery_after_bump() {
        let table = table();
        table.bump("A", t0());
        table.sweep(t0() + minutes(6));
        assert_eq!(table.snapshot()["A"].state, HealthState::Unhealthy);

        table.bump("A", t0() + minutes(10));
        let transitions = table.sweep(t0() + minutes(11));
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].from, HealthState::Unhealthy);
        assert_eq!(transitions[0].to, HealthState::Healthy);
        assert_eq!(table.snapshot()["A"].state, HealthState::Healthy);
    }

    #[test]
    fn test_stale_record_stays_unhealthy_without_bump() {
        let table = table();
        table.bump("A", t0());
        table.sweep(t0() + minutes(6));

        for m in 7..12 {
            assert!(table.sweep(t0() + minutes(m)).is_empty());
        }
        assert_eq!(table.snapshot()["A"].state, HealthState::Unhealthy);
    }

    #[test]
    fn test_sweep_handles_mixed_fleet() {
        let table = table();
        table.bump("stale", t0());
        table.bump("fresh", t0() + minutes(4));

        let transitions = table.sweep(t0() + minutes(6));
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].client_id, "stale");
        assert_eq!(table.snapshot()["fresh"].state, HealthState::Healthy);
    }

    #[test]
    fn test_records_accumulate_and_are_never_dropped() {
        let table = table();
        for i in 0..20 {
            table.bump(&format!("dev{i}"), t0());
        }
        table.sweep(t0() + minutes(6));
        assert_eq!(table.len(), 20);
    }

    #[test]
    fn test_empty_table_sweep_is_noop() {
        let table = table();
        assert!(table.sweep(t0()).is_empty());
        assert!(table.is_empty());
    }
}
