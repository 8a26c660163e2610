//! Acquisition requests and polling backoff

use crate::error::{LockError, LockResult};
use crate::identity::LockIdentity;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay policy between acquisition attempts while a lock is contended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed {
        /// Delay between attempts
        #[serde(with = "crate::config::millis_serde")]
        interval: Duration,
    },
    /// Doubling delay, capped at `max`
    Exponential {
        /// First delay
        #[serde(with = "crate::config::millis_serde")]
        initial: Duration,
        /// Upper bound for any single delay
        #[serde(with = "crate::config::millis_serde")]
        max: Duration,
        /// Add up to 50% random delay to spread out competing pollers
        #[serde(default)]
        jitter: bool,
    },
}

impl Backoff {
    /// Fixed interval backoff
    pub fn fixed(interval: Duration) -> Self {
        Self::Fixed { interval }
    }

    /// Exponential backoff without jitter
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self::Exponential {
            initial,
            max,
            jitter: false,
        }
    }

    /// Enable jitter (exponential only; fixed intervals are returned unchanged)
    pub fn with_jitter(self) -> Self {
        match self {
            Self::Exponential { initial, max, .. } => Self::Exponential {
                initial,
                max,
                jitter: true,
            },
            fixed => fixed,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed { interval } => interval,
            Self::Exponential {
                initial,
                max,
                jitter,
            } => {
                let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
                let base = initial.saturating_mul(factor).min(max);
                if jitter && !base.is_zero() {
                    let extra = rand::rng().random_range(0..=base.as_millis() as u64 / 2);
                    (base + Duration::from_millis(extra)).min(max)
                } else {
                    base
                }
            }
        }
    }

    fn smallest_delay(&self) -> Duration {
        match *self {
            Self::Fixed { interval } => interval,
            Self::Exponential { initial, max, .. } => initial.min(max),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(10), Duration::from_millis(200))
    }
}

/// Everything needed to attempt one acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRequest {
    /// Which lock
    pub identity: LockIdentity,
    /// How long to keep polling; zero means a single attempt
    pub wait_time: Duration,
    /// Server-enforced expiry of the record once acquired
    pub lease_time: Duration,
    /// Delay policy between attempts
    pub backoff: Backoff,
}

impl AcquisitionRequest {
    /// Request a single attempt with the default backoff.
    pub fn new(identity: LockIdentity, lease_time: Duration) -> Self {
        Self {
            identity,
            wait_time: Duration::ZERO,
            lease_time,
            backoff: Backoff::default(),
        }
    }

    /// Start a builder.
    pub fn builder(identity: LockIdentity) -> AcquisitionRequestBuilder {
        AcquisitionRequestBuilder::new(identity)
    }

    /// Set the wait budget
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Set the backoff policy
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Poll at a fixed interval
    pub fn with_poll_interval(self, interval: Duration) -> Self {
        self.with_backoff(Backoff::fixed(interval))
    }

    /// Check the request before any store interaction.
    pub fn validate(&self) -> LockResult<()> {
        if self.lease_time.is_zero() {
            return Err(LockError::invalid("lease_time must be greater than zero"));
        }
        if !self.wait_time.is_zero() && self.backoff.smallest_delay().is_zero() {
            return Err(LockError::invalid(
                "poll interval must be greater than zero when waiting",
            ));
        }
        Ok(())
    }
}

/// Builder for [`AcquisitionRequest`]
#[derive(Debug, Clone)]
pub struct AcquisitionRequestBuilder {
    request: AcquisitionRequest,
}

impl AcquisitionRequestBuilder {
    fn new(identity: LockIdentity) -> Self {
        Self {
            request: AcquisitionRequest::new(identity, Duration::from_secs(30)),
        }
    }

    /// Set the wait budget
    pub fn wait_time(mut self, wait_time: Duration) -> Self {
        self.request.wait_time = wait_time;
        self
    }

    /// Set the lease
    pub fn lease_time(mut self, lease_time: Duration) -> Self {
        self.request.lease_time = lease_time;
        self
    }

    /// Set the backoff policy
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.request.backoff = backoff;
        self
    }

    /// Poll at a fixed interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.request.backoff = Backoff::fixed(interval);
        self
    }

    /// Validate and build
    pub fn build(self) -> LockResult<AcquisitionRequest> {
        self.request.validate()?;
        Ok(self.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> LockIdentity {
        LockIdentity::new("ORDER", "42").unwrap()
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let backoff = Backoff::exponential(Duration::from_millis(10), Duration::from_millis(50));
        assert_eq!(backoff.delay(0), Duration::from_millis(10));
        assert_eq!(backoff.delay(1), Duration::from_millis(20));
        assert_eq!(backoff.delay(2), Duration::from_millis(40));
        assert_eq!(backoff.delay(3), Duration::from_millis(50));
        assert_eq!(backoff.delay(200), Duration::from_millis(50));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let backoff =
            Backoff::exponential(Duration::from_millis(100), Duration::from_millis(120)).with_jitter();
        for attempt in 0..20 {
            let delay = backoff.delay(attempt);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(120));
        }
    }

    #[test]
    fn test_fixed_delay() {
        let backoff = Backoff::fixed(Duration::from_millis(25)).with_jitter();
        assert_eq!(backoff.delay(0), Duration::from_millis(25));
        assert_eq!(backoff.delay(9), Duration::from_millis(25));
    }

    #[test]
    fn test_zero_lease_rejected() {
        let err = AcquisitionRequest::builder(identity())
            .lease_time(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, LockError::InvalidArgument(_)));
    }

    #[test]
    fn test_zero_poll_interval_rejected_only_when_waiting() {
        let no_wait = AcquisitionRequest::new(identity(), Duration::from_secs(1))
            .with_poll_interval(Duration::ZERO);
        assert!(no_wait.validate().is_ok());

        let waiting = no_wait.with_wait_time(Duration::from_secs(1));
        assert!(matches!(
            waiting.validate(),
            Err(LockError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_builder_defaults() {
        let request = AcquisitionRequest::builder(identity()).build().unwrap();
        assert_eq!(request.wait_time, Duration::ZERO);
        assert_eq!(request.lease_time, Duration::from_secs(30));
        assert_eq!(request.backoff, Backoff::default());
    }

    #[test]
    fn test_backoff_serde() {
        let backoff: Backoff =
            serde_json::from_str(r#"{"type":"exponential","initial":5,"max":100}"#).unwrap();
        assert_eq!(
            backoff,
            Backoff::exponential(Duration::from_millis(5), Duration::from_millis(100))
        );

        let fixed: Backoff = serde_json::from_str(r#"{"type":"fixed","interval":50}"#).unwrap();
        assert_eq!(fixed, Backoff::fixed(Duration::from_millis(50)));
    }
}
