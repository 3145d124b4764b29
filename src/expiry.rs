//! TTL bookkeeping.
//!
//! In-process expiry uses the monotonic clock. The file backend stores
//! absolute Unix timestamps on disk, so it uses the wall-clock variants.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Longest TTL honoured in-process; larger values are clamped.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Absolute expiry instant for a relative TTL.
///
/// - `None` means the entry never expires.
/// - `Duration::ZERO` yields an instant that has already elapsed.
/// - Any other TTL yields `now + ttl`.
pub fn compute_expiry(ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|ttl| Instant::now() + ttl.min(MAX_TTL))
}

/// Remaining time before `expiry`; never negative.
pub fn remaining_ttl(expiry: Option<Instant>) -> Option<Duration> {
    expiry.map(|at| at.saturating_duration_since(Instant::now()))
}

/// Whether an entry with this expiry should be treated as absent.
pub fn is_expired(expiry: Option<Instant>) -> bool {
    match expiry {
        Some(at) => Instant::now() >= at,
        None => false,
    }
}

/// Current Unix time in fractional seconds.
pub fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Wall-clock counterpart of [`compute_expiry`], in Unix seconds.
pub fn compute_unix_expiry(ttl: Option<Duration>) -> Option<f64> {
    ttl.map(|ttl| now_seconds() + ttl.as_secs_f64())
}

/// Wall-clock counterpart of [`remaining_ttl`].
pub fn remaining_unix_ttl(expiry: Option<f64>) -> Option<Duration> {
    expiry.map(|at| {
        let left = at - now_seconds();
        if left > 0.0 {
            Duration::try_from_secs_f64(left).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    })
}

/// Wall-clock counterpart of [`is_expired`].
pub fn is_unix_expired(expiry: Option<f64>) -> bool {
    match expiry {
        Some(at) => now_seconds() >= at,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_compute_expiry_none_and_zero() {
        assert!(compute_expiry(None).is_none());
        assert!(remaining_ttl(None).is_none());

        let elapsed = compute_expiry(Some(Duration::ZERO));
        assert!(is_expired(elapsed));
        assert_eq!(remaining_ttl(elapsed), Some(Duration::ZERO));
    }

    #[test]
    fn test_positive_ttl_is_live() {
        let expiry = compute_expiry(Some(Duration::from_secs(60)));
        assert!(!is_expired(expiry));
        let left = remaining_ttl(expiry).expect("expiry set");
        assert!(left <= Duration::from_secs(60));
        assert!(left > Duration::from_secs(58));
    }

    #[test]
    fn test_short_ttl_elapses() {
        let expiry = compute_expiry(Some(Duration::from_millis(20)));
        std::thread::sleep(Duration::from_millis(40));
        assert!(is_expired(expiry));
        assert_eq!(remaining_ttl(expiry), Some(Duration::ZERO));
    }

    #[test]
    fn test_unix_expiry() {
        assert!(compute_unix_expiry(None).is_none());
        assert!(is_unix_expired(Some(0.0)));
        assert_eq!(remaining_unix_ttl(Some(0.0)), Some(Duration::ZERO));

        let at = compute_unix_expiry(Some(Duration::from_secs(30)));
        assert!(!is_unix_expired(at));
        assert!(remaining_unix_ttl(at).expect("expiry set") > Duration::from_secs(28));
    }

    #[test]
    fn test_now_seconds_is_after_epoch() {
        assert!(now_seconds() > 1_600_000_000.0);
    }

    proptest! {
        #[test]
        fn prop_remaining_never_exceeds_ttl(ms in 0u64..10_000_000) {
            let ttl = Duration::from_millis(ms);
            let left = remaining_ttl(compute_expiry(Some(ttl))).expect("expiry set");
            prop_assert!(left <= ttl);
        }
    }
}
