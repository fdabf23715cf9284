//! Process memory budget tracking
//!
//! The memory-optimized ingest path checks a resident-set budget between
//! span batches. Readings come from `/proc/self/statm` on Linux; on other
//! platforms the monitor reports zero usage and the budget never trips.
//! Polling is rate-limited to 1 Hz behind a mutex so hot loops can call
//! [`MemoryMonitor::check_budget`] freely.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default peak memory budget for trace ingestion: 500 MiB
pub const DEFAULT_MEMORY_LIMIT: u64 = 500 * 1024 * 1024;

/// Budget fraction at which ingestion starts shedding intermediate buffers
const PRESSURE_THRESHOLD: f64 = 0.8;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
#[error("memory budget exceeded: using {used} bytes of {limit} allowed")]
pub struct MemoryBudgetExceeded {
    pub used: u64,
    pub limit: u64,
}

#[derive(Debug)]
struct MonitorState {
    last_poll: Option<Instant>,
    last_reading: u64,
}

/// Rate-limited resident-memory monitor with a fixed budget
#[derive(Debug)]
pub struct MemoryMonitor {
    limit_bytes: u64,
    state: Mutex<MonitorState>,
}

impl MemoryMonitor {
    pub fn new(limit_bytes: u64) -> Self {
        Self {
            limit_bytes,
            state: Mutex::new(MonitorState {
                last_poll: None,
                last_reading: 0,
            }),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit_bytes
    }

    /// Current resident usage in bytes, refreshed at most once per second
    pub fn current_usage(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let stale = state
            .last_poll
            .map(|at| at.elapsed() >= POLL_INTERVAL)
            .unwrap_or(true);
        if stale {
            state.last_reading = read_process_rss().unwrap_or(0);
            state.last_poll = Some(Instant::now());
        }
        state.last_reading
    }

    /// Fail when resident usage exceeds the configured budget
    pub fn check_budget(&self) -> Result<(), MemoryBudgetExceeded> {
        let used = self.current_usage();
        if used > self.limit_bytes {
            return Err(MemoryBudgetExceeded {
                used,
                limit: self.limit_bytes,
            });
        }
        Ok(())
    }

    /// True at or above 80% of the budget
    pub fn under_pressure(&self) -> bool {
        let used = self.current_usage();
        used as f64 >= self.limit_bytes as f64 * PRESSURE_THRESHOLD
    }
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_LIMIT)
    }
}

/// Resident set size from `/proc/self/statm` (field 2, in pages)
#[cfg(target_os = "linux")]
fn read_process_rss() -> Option<u64> {
    const PAGE_SIZE: u64 = 4096;
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * PAGE_SIZE)
}

#[cfg(not(target_os = "linux"))]
fn read_process_rss() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generous_budget_never_trips() {
        let monitor = MemoryMonitor::new(u64::MAX);
        assert!(monitor.check_budget().is_ok());
        assert!(!monitor.under_pressure());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_tiny_budget_trips() {
        let monitor = MemoryMonitor::new(1);
        let err = monitor.check_budget().unwrap_err();
        assert!(err.used > 1);
        assert!(err.to_string().contains("memory budget exceeded"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_rss_reading_is_nonzero() {
        assert!(read_process_rss().unwrap() > 0);
    }

    #[test]
    fn test_reading_is_cached_between_polls() {
        let monitor = MemoryMonitor::new(DEFAULT_MEMORY_LIMIT);
        let first = monitor.current_usage();
        // A second call inside the poll interval returns the cached value.
        assert_eq!(monitor.current_usage(), first);
    }

    #[test]
    fn test_default_limit() {
        let monitor = MemoryMonitor::default();
        assert_eq!(monitor.limit(), 500 * 1024 * 1024);
    }
}
