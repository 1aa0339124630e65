use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    active: u64,
    total: u64,
    succeeded: u64,
    failed: u64,
    total_execution_ms: u64,
}

/// Execution statistics for one server instance.
///
/// Every update and every snapshot goes through the same lock, so a snapshot
/// never observes a half-applied completion.
#[derive(Debug, Default)]
pub struct Stats {
    inner: Mutex<Counters>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub active_requests: u64,
    pub total_requests: u64,
    pub success_requests: u64,
    pub failed_requests: u64,
    pub total_execution_ms: u64,
    pub avg_execution_ms: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        // Counters stay consistent under poisoning: every update is a few plain
        // integer writes.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_start(&self) {
        let mut c = self.lock();
        c.active += 1;
        c.total += 1;
    }

    pub fn record_success(&self, started_at: Instant) {
        let elapsed = elapsed_ms(started_at);
        let mut c = self.lock();
        c.active = c.active.saturating_sub(1);
        c.succeeded += 1;
        c.total_execution_ms += elapsed;
    }

    pub fn record_failure(&self, started_at: Instant) {
        let elapsed = elapsed_ms(started_at);
        let mut c = self.lock();
        c.active = c.active.saturating_sub(1);
        c.failed += 1;
        c.total_execution_ms += elapsed;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = self.lock();
        let completed = c.succeeded + c.failed;
        let avg_execution_ms = if completed == 0 {
            0
        } else {
            c.total_execution_ms / completed
        };
        StatsSnapshot {
            active_requests: c.active,
            total_requests: c.total,
            success_requests: c.succeeded,
            failed_requests: c.failed,
            total_execution_ms: c.total_execution_ms,
            avg_execution_ms,
        }
    }
}

fn elapsed_ms(started_at: Instant) -> u64 {
    u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
}
