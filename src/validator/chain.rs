use super::{ValidationError, Validator};
use crate::challenge::AuthorizationChallenge;
use crate::solver::Solver;
use async_trait::async_trait;

/// Delegates to the first validator supporting the challenge.
#[derive(Default)]
pub struct ChainValidator {
    validators: Vec<Box<dyn Validator>>,
}

impl ChainValidator {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }
}

#[async_trait]
impl Validator for ChainValidator {
    fn supports(&self, challenge: &AuthorizationChallenge, solver: &dyn Solver) -> bool {
        self.validators.iter().any(|validator| validator.supports(challenge, solver))
    }

    async fn is_valid(&self, challenge: &AuthorizationChallenge, solver: &dyn Solver) -> Result<bool, ValidationError> {
        match self.validators.iter().find(|validator| validator.supports(challenge, solver)) {
            Some(validator) => validator.is_valid(challenge, solver).await,
            None => Err(ValidationError::NotSupported {
                domain: challenge.domain().to_string(),
                kind: challenge.kind().to_string(),
            }),
        }
    }
}
