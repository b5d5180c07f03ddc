//! Per-domain request pacing
//!
//! A `Pacer` is shared by every request path of a crawl run (page fetches,
//! HEAD probes, binary downloads, robots.txt lookups). Each host gets a
//! reserved dispatch slot under a lock, and the caller sleeps outside the lock
//! until its slot arrives, so concurrent callers never exceed one request per
//! host per delay window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct PacerState {
    /// Dispatch time of the most recently reserved slot per host
    last_slot: HashMap<String, Instant>,

    /// Per-host delays that replace the default (e.g. robots.txt Crawl-delay)
    overrides: HashMap<String, Duration>,
}

/// Shared per-host pacing gate
#[derive(Debug, Clone)]
pub struct Pacer {
    default_delay: Duration,
    state: Arc<Mutex<PacerState>>,
}

impl Pacer {
    /// Creates a pacer enforcing `default_delay` between requests to a host
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            state: Arc::new(Mutex::new(PacerState::default())),
        }
    }

    /// Returns the delay currently enforced for `host`
    pub fn delay_for(&self, host: &str) -> Duration {
        let state = self.lock();
        state
            .overrides
            .get(host)
            .copied()
            .unwrap_or(self.default_delay)
    }

    /// Raises the delay for `host` to at least `delay`
    ///
    /// Never lowers the delay below the configured default.
    pub fn raise_delay(&self, host: &str, delay: Duration) {
        if delay <= self.default_delay {
            return;
        }

        let mut state = self.lock();
        let entry = state
            .overrides
            .entry(host.to_string())
            .or_insert(self.default_delay);
        if delay > *entry {
            tracing::info!("Pacing for {} raised to {:?}", host, delay);
            *entry = delay;
        }
    }

    /// Waits until a request to `host` may be dispatched
    ///
    /// The slot is reserved before sleeping. Dropping the future leaves the
    /// slot spent.
    pub async fn wait(&self, host: &str) {
        let slot = self.reserve(host, Instant::now());
        let now = Instant::now();
        if slot > now {
            tracing::debug!("Pacing {} for {:?}", host, slot - now);
            tokio::time::sleep_until(slot).await;
        }
    }

    /// Reserves the next dispatch slot for `host` relative to `now`
    fn reserve(&self, host: &str, now: Instant) -> Instant {
        let mut state = self.lock();
        let delay = state
            .overrides
            .get(host)
            .copied()
            .unwrap_or(self.default_delay);

        let slot = match state.last_slot.get(host) {
            Some(last) => (*last + delay).max(now),
            None => now,
        };
        state.last_slot.insert(host.to_string(), slot);
        slot
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PacerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_is_immediate() {
        let pacer = Pacer::new(Duration::from_secs(1));
        let now = Instant::now();
        assert_eq!(pacer.reserve("example.com", now), now);
    }

    #[test]
    fn test_second_slot_is_spaced() {
        let pacer = Pacer::new(Duration::from_secs(1));
        let now = Instant::now();

        let first = pacer.reserve("example.com", now);
        let second = pacer.reserve("example.com", now);
        let third = pacer.reserve("example.com", now);

        assert_eq!(second - first, Duration::from_secs(1));
        assert_eq!(third - second, Duration::from_secs(1));
    }

    #[test]
    fn test_hosts_are_independent() {
        let pacer = Pacer::new(Duration::from_secs(5));
        let now = Instant::now();

        pacer.reserve("a.test", now);
        assert_eq!(pacer.reserve("b.test", now), now);
    }

    #[test]
    fn test_raise_delay_only_increases() {
        let pacer = Pacer::new(Duration::from_secs(2));

        pacer.raise_delay("example.com", Duration::from_secs(1));
        assert_eq!(pacer.delay_for("example.com"), Duration::from_secs(2));

        pacer.raise_delay("example.com", Duration::from_secs(10));
        assert_eq!(pacer.delay_for("example.com"), Duration::from_secs(10));

        pacer.raise_delay("example.com", Duration::from_secs(5));
        assert_eq!(pacer.delay_for("example.com"), Duration::from_secs(10));
        assert_eq!(pacer.delay_for("other.com"), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_wait_enforces_delay_in_real_time() {
        let pacer = Pacer::new(Duration::from_millis(300));

        let start = std::time::Instant::now();
        pacer.wait("example.com").await;
        let first = start.elapsed();
        pacer.wait("example.com").await;
        let second = start.elapsed();

        assert!(first < Duration::from_millis(100));
        assert!(second - first >= Duration::from_millis(290));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let pacer = Pacer::new(Duration::from_millis(200));
        let other = pacer.clone();

        let start = std::time::Instant::now();
        pacer.wait("example.com").await;
        other.wait("example.com").await;

        assert!(start.elapsed() >= Duration::from_millis(190));
    }
}
