use std::time::Duration;

/// Retry and poll budgets for every bounded wait in the engine.
///
/// All waits are fixed-interval, not exponential: the cloud's
/// read-after-write lag is measured in single-digit seconds, so flat
/// polling converges quickly without backoff machinery.
#[derive(Debug, Clone)]
pub struct Budgets {
    /// Launch attempts while the API reports transient parameter errors.
    pub launch_attempts: u32,
    pub launch_retry_delay: Duration,
    /// NAT gateways take minutes to come up.
    pub nat_poll_attempts: u32,
    pub nat_poll_interval: Duration,
    /// Wait for an instance to reach the running state.
    pub run_poll_attempts: u32,
    pub run_poll_interval: Duration,
    /// Wait for a just-created instance profile to become visible.
    pub profile_poll_attempts: u32,
    pub profile_poll_interval: Duration,
    /// Wait for a launched interface to report its private address.
    pub ip_poll_attempts: u32,
    pub ip_poll_interval: Duration,
}

impl Default for Budgets {
    fn default() -> Self {
        Budgets {
            launch_attempts: 5,
            launch_retry_delay: Duration::from_secs(2),
            nat_poll_attempts: 40,
            nat_poll_interval: Duration::from_secs(15),
            run_poll_attempts: 40,
            run_poll_interval: Duration::from_secs(15),
            profile_poll_attempts: 40,
            profile_poll_interval: Duration::from_secs(1),
            ip_poll_attempts: 5,
            ip_poll_interval: Duration::from_secs(2),
        }
    }
}

impl Budgets {
    /// Same attempt counts, millisecond intervals. For tests driving
    /// the simulated provider.
    pub fn fast() -> Self {
        let tick = Duration::from_millis(1);
        Budgets {
            launch_retry_delay: tick,
            nat_poll_interval: tick,
            run_poll_interval: tick,
            profile_poll_interval: tick,
            ip_poll_interval: tick,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budgets_match_protocol() {
        let b = Budgets::default();
        assert_eq!(b.launch_attempts, 5);
        assert_eq!(b.launch_retry_delay, Duration::from_secs(2));
        assert_eq!(b.ip_poll_attempts, 5);
    }

    #[test]
    fn test_fast_keeps_attempt_counts() {
        let b = Budgets::fast();
        assert_eq!(b.launch_attempts, Budgets::default().launch_attempts);
        assert!(b.nat_poll_interval < Duration::from_millis(10));
    }
}
