//! Consecutive-failure lockout.
//!
//! The policy itself is pure. The counter transitions are performed by
//! [`UserRepository`](crate::db::repositories::user::UserRepository) as SQL-side
//! updates so concurrent attempts on one account cannot lose increments.

use chrono::{DateTime, Duration, Utc};

use crate::config::LockoutConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub duration: Duration,
}

impl LockoutPolicy {
    pub fn from_config(config: &LockoutConfig) -> anyhow::Result<Self> {
        let duration = i64::try_from(config.lockout_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| anyhow::anyhow!("Lockout duration is out of range"))?;

        Ok(Self {
            max_attempts: config.max_attempts,
            duration,
        })
    }

    /// Counter value at which the account locks, in the store's integer type.
    #[must_use]
    pub fn threshold(&self) -> i32 {
        i32::try_from(self.max_attempts).unwrap_or(i32::MAX)
    }

    /// `None` when the lock would end past the last representable instant.
    #[must_use]
    pub fn lock_deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_add_signed(self.duration)
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            duration: Duration::minutes(15),
        }
    }
}

/// Lockout fields of one identity after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutState {
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutState {
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        is_locked(self.locked_until, now)
    }
}

/// A lock holds until wall-clock time passes `locked_until`; nothing sweeps
/// expired locks.
#[must_use]
pub fn is_locked(locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    locked_until.is_some_and(|until| until > now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlocked_without_deadline() {
        assert!(!is_locked(None, Utc::now()));
    }

    #[test]
    fn locked_until_deadline_passes() {
        let now = Utc::now();
        let until = now + Duration::minutes(15);
        assert!(is_locked(Some(until), now));
        assert!(is_locked(Some(until), until - Duration::seconds(1)));
        assert!(!is_locked(Some(until), until));
        assert!(!is_locked(Some(until), until + Duration::seconds(1)));
    }

    #[test]
    fn policy_from_config() {
        let policy = LockoutPolicy::from_config(&LockoutConfig {
            max_attempts: 3,
            lockout_seconds: 60,
        })
        .unwrap();
        assert_eq!(policy.threshold(), 3);
        let now = Utc::now();
        assert_eq!(policy.lock_deadline(now), Some(now + Duration::seconds(60)));
    }

    #[test]
    fn unrepresentable_duration_is_rejected() {
        let config = LockoutConfig {
            max_attempts: 5,
            lockout_seconds: u64::MAX,
        };
        assert!(LockoutPolicy::from_config(&config).is_err());

        let policy = LockoutPolicy::default();
        assert_eq!(policy, LockoutPolicy::from_config(&LockoutConfig::default()).unwrap());
        assert_eq!(policy.lock_deadline(DateTime::<Utc>::MAX_UTC), None);
    }

    #[test]
    fn default_policy_is_five_attempts_fifteen_minutes() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.duration, Duration::minutes(15));
    }

    #[test]
    fn state_reports_lock() {
        let now = Utc::now();
        let state = LockoutState {
            failed_attempts: 5,
            locked_until: Some(now + Duration::minutes(1)),
        };
        assert!(state.is_locked(now));
        assert!(!state.is_locked(now + Duration::minutes(2)));
    }
}
