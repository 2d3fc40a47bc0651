use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Starting,
    Healthy,
    Restarting,
    Unhealthy,
    Stopped,
}

/// Observable health of one pool entry, returned by `Pool::get_health` and
/// updated by the health loop.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub status: HealthStatus,
    pub last_check: Instant,
    pub crash_count: u32,
    pub crash_window_start: Option<Instant>,
    pub started_at: Option<Instant>,
    pub last_error: Option<String>,
}

impl HealthRecord {
    pub fn new() -> Self {
        HealthRecord {
            status: HealthStatus::Starting,
            last_check: Instant::now(),
            crash_count: 0,
            crash_window_start: None,
            started_at: None,
            last_error: None,
        }
    }
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRecord {
    /// Records one crash observation at `now` and returns the status it
    /// leaves the entry in. Resets the crash count once `window` has
    /// elapsed since the window started; flips to `Unhealthy` once
    /// `crash_count` reaches `max_restarts` within one window, `Restarting`
    /// otherwise. `Pool::handle_crash` drives the actual restart from this.
    pub fn record_crash(&mut self, now: Instant, window: Duration, max_restarts: u32) -> HealthStatus {
        let window_start = *self.crash_window_start.get_or_insert(now);
        if now.duration_since(window_start) > window {
            self.crash_window_start = Some(now);
            self.crash_count = 0;
        }
        self.crash_count += 1;
        self.status = if self.crash_count >= max_restarts {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Restarting
        };
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn restarts_until_max_then_goes_unhealthy() {
        let mut health = HealthRecord::new();
        let window = Duration::from_secs(300);

        let status = health.record_crash(Instant::now(), window, 3);
        assert_eq!(status, HealthStatus::Restarting);
        assert_eq!(health.crash_count, 1);

        let status = health.record_crash(Instant::now(), window, 3);
        assert_eq!(status, HealthStatus::Restarting);
        assert_eq!(health.crash_count, 2);

        let status = health.record_crash(Instant::now(), window, 3);
        assert_eq!(status, HealthStatus::Unhealthy);
        assert_eq!(health.crash_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn crash_count_resets_once_the_window_elapses() {
        let mut health = HealthRecord::new();
        let window = Duration::from_secs(60);

        health.record_crash(Instant::now(), window, 3);
        health.record_crash(Instant::now(), window, 3);
        assert_eq!(health.crash_count, 2);

        tokio::time::advance(window + Duration::from_secs(1)).await;
        let status = health.record_crash(Instant::now(), window, 3);
        assert_eq!(status, HealthStatus::Restarting);
        assert_eq!(health.crash_count, 1);
    }
}
