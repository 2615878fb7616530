//! Local pre-validation of challenges before the CA is asked to verify them.
//!
//! Validators report "not valid yet" as `Ok(false)` so that callers can keep
//! polling. Only a challenge no validator understands is an error.

mod chain;
mod dns;
mod http;
mod waiting;

pub use chain::ChainValidator;
pub use dns::DnsValidator;
pub use http::HttpValidator;
pub use waiting::WaitingValidator;

use crate::challenge::AuthorizationChallenge;
use crate::https_helper::HttpsRequestError;
use crate::solver::Solver;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[async_trait]
pub trait Validator: Send + Sync {
    fn supports(&self, challenge: &AuthorizationChallenge, solver: &dyn Solver) -> bool;
    async fn is_valid(&self, challenge: &AuthorizationChallenge, solver: &dyn Solver) -> Result<bool, ValidationError>;
}

#[async_trait]
impl<T: Validator + ?Sized> Validator for Arc<T> {
    fn supports(&self, challenge: &AuthorizationChallenge, solver: &dyn Solver) -> bool {
        (**self).supports(challenge, solver)
    }
    async fn is_valid(&self, challenge: &AuthorizationChallenge, solver: &dyn Solver) -> Result<bool, ValidationError> {
        (**self).is_valid(challenge, solver).await
    }
}

#[async_trait]
impl<T: Validator + ?Sized> Validator for Box<T> {
    fn supports(&self, challenge: &AuthorizationChallenge, solver: &dyn Solver) -> bool {
        (**self).supports(challenge, solver)
    }
    async fn is_valid(&self, challenge: &AuthorizationChallenge, solver: &dyn Solver) -> Result<bool, ValidationError> {
        (**self).is_valid(challenge, solver).await
    }
}

/// HTTP-01 and DNS-01 validators, each retried until the record shows up.
pub fn default_validator() -> Result<ChainValidator, HttpsRequestError> {
    Ok(ChainValidator::new()
        .push(WaitingValidator::new(HttpValidator::new()?))
        .push(WaitingValidator::new(DnsValidator::new())))
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no validator supports {kind} challenges (domain {domain})")]
    NotSupported { domain: String, kind: String },
}
