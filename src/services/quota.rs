use chrono::{Duration, Utc};

use crate::error::{AppError, AppResult};
use crate::models::User;

/// Per-user daily generation gate.
///
/// Rolls the user's quota period to today and checks the ceiling before any
/// generation work. The counter itself increments only once, only after a new
/// recommendation has been durably recorded (the orchestrator's commit step).
/// Under concurrent requests the ceiling is a soft limit: two in-flight
/// generations may both pass this gate before either commits.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    daily_limit: u32,
}

impl QuotaTracker {
    pub fn new(daily_limit: u32) -> Self {
        Self { daily_limit }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Rolls the period and returns the remaining allowance before this
    /// request, or `QuotaExceeded` carrying the time to the midnight reset.
    pub fn consume(&self, user: &mut User) -> AppResult<u32> {
        if user.check_and_roll_daily_quota(self.daily_limit) {
            Ok(self.daily_limit - user.daily_quota.count)
        } else {
            Err(AppError::QuotaExceeded {
                resets_in_secs: seconds_until_midnight_utc(),
            })
        }
    }
}

/// Seconds until the next UTC midnight, when daily counters reset.
pub fn seconds_until_midnight_utc() -> i64 {
    let now = Utc::now();
    let tomorrow = (now.date_naive() + Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc();
    (tomorrow - now).num_seconds().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_consume_under_limit() {
        let tracker = QuotaTracker::new(5);
        let mut user = User::new("sub1", "a@b.c", "A");
        user.daily_quota.count = 2;

        assert_eq!(tracker.consume(&mut user).unwrap(), 3);
        // Gate does not increment; commit does.
        assert_eq!(user.daily_quota.count, 2);
    }

    #[test]
    fn test_consume_at_ceiling() {
        let tracker = QuotaTracker::new(5);
        let mut user = User::new("sub1", "a@b.c", "A");
        user.daily_quota.count = 5;

        match tracker.consume(&mut user).unwrap_err() {
            AppError::QuotaExceeded { resets_in_secs } => {
                assert!(resets_in_secs > 0);
                assert!(resets_in_secs <= 86_400);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_consume_rolls_stale_period_first() {
        let tracker = QuotaTracker::new(5);
        let mut user = User::new("sub1", "a@b.c", "A");
        user.daily_quota.count = 5;
        user.daily_quota.period_start = Utc::now().date_naive() - Duration::days(1);

        // At the ceiling yesterday, but a new calendar day resets first.
        assert_eq!(tracker.consume(&mut user).unwrap(), 5);
        assert_eq!(user.daily_quota.count, 0);
    }
}
