use super::{ValidationError, Validator};
use crate::challenge::AuthorizationChallenge;
use crate::solver::Solver;
use async_io::Timer;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Retries the wrapped validator until it succeeds or the timeout passes.
///
/// Running out of time yields `Ok(false)`, leaving the decision to the caller.
pub struct WaitingValidator<V: Validator> {
    validator: V,
    timeout: Duration,
    interval: Duration,
}

impl<V: Validator> WaitingValidator<V> {
    pub fn new(validator: V) -> Self {
        Self {
            validator,
            timeout: Duration::from_secs(180),
            interval: Duration::from_secs(3),
        }
    }
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl<V: Validator> Validator for WaitingValidator<V> {
    fn supports(&self, challenge: &AuthorizationChallenge, solver: &dyn Solver) -> bool {
        self.validator.supports(challenge, solver)
    }

    async fn is_valid(&self, challenge: &AuthorizationChallenge, solver: &dyn Solver) -> Result<bool, ValidationError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.validator.is_valid(challenge, solver).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                log::warn!("{} challenge for {} still not valid locally", challenge.kind(), challenge.domain());
                return Ok(false);
            }
            log::debug!("{} challenge for {} not valid yet", challenge.kind(), challenge.domain());
            Timer::after(self.interval).await;
        }
    }
}
