//! Solvers make a challenge's expected response reachable by the CA.

mod simple;
mod webroot;

pub use simple::{SimpleDnsSolver, SimpleHttpSolver};
pub use webroot::WebrootHttpSolver;

use crate::challenge::AuthorizationChallenge;
use crate::registry::{Registry, RegistryError};
use async_trait::async_trait;
use std::io;
use thiserror::Error;

#[async_trait]
pub trait Solver: Send + Sync {
    fn supports(&self, challenge: &AuthorizationChallenge) -> bool;
    async fn solve(&self, challenge: &AuthorizationChallenge) -> Result<(), SolverError>;
    async fn cleanup(&self, challenge: &AuthorizationChallenge) -> Result<(), SolverError>;
}

/// `http` and `dns` map to the solvers that print manual instructions.
pub fn default_registry() -> Result<Registry<dyn Solver>, RegistryError> {
    let mut registry: Registry<dyn Solver> = Registry::new();
    registry.register("http", Box::new(SimpleHttpSolver))?;
    registry.register("dns", Box::new(SimpleDnsSolver))?;
    Ok(registry)
}

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("refusing to write challenge token {0:?}")]
    InvalidToken(String),
}
