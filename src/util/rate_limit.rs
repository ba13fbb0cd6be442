//! Rate limiting utilities

use std::num::NonZeroU32;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use uuid::Uuid;

/// Per-user limit on action submissions
pub struct ActionRateLimiter {
    limiter: DefaultKeyedRateLimiter<Uuid>,
}

impl ActionRateLimiter {
    /// Allow `per_second` submissions per user, at least one
    pub fn new(per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// Whether the user may submit now. An allowed check uses up quota.
    pub fn check(&self, user_id: Uuid) -> bool {
        self.limiter.check_key(&user_id).is_ok()
    }

    /// Forget users that have not been seen for a while
    pub fn shrink(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_applies_per_user() {
        let limiter = ActionRateLimiter::new(2);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        assert!(limiter.check(alice));
        assert!(limiter.check(alice));
        assert!(!limiter.check(alice));
        assert!(limiter.check(bob));
    }

    #[test]
    fn zero_still_allows_one() {
        let limiter = ActionRateLimiter::new(0);
        assert!(limiter.check(Uuid::new_v4()));
    }
}
