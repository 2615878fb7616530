use super::{Solver, SolverError};
use crate::challenge::{AuthorizationChallenge, DnsDataExtractor, HttpDataExtractor, DNS_01, HTTP_01};
use async_trait::async_trait;

/// Logs what to serve over HTTP and leaves the serving to the operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleHttpSolver;

#[async_trait]
impl Solver for SimpleHttpSolver {
    fn supports(&self, challenge: &AuthorizationChallenge) -> bool {
        challenge.kind() == HTTP_01
    }
    async fn solve(&self, challenge: &AuthorizationChallenge) -> Result<(), SolverError> {
        log::info!(
            "serve {:?} at {} to prove control of {}",
            HttpDataExtractor::check_content(challenge),
            HttpDataExtractor::check_url(challenge),
            challenge.domain()
        );
        Ok(())
    }
    async fn cleanup(&self, challenge: &AuthorizationChallenge) -> Result<(), SolverError> {
        log::info!("{} may be removed", HttpDataExtractor::check_url(challenge));
        Ok(())
    }
}

/// Logs the TXT record to publish and leaves the publishing to the operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleDnsSolver;

#[async_trait]
impl Solver for SimpleDnsSolver {
    fn supports(&self, challenge: &AuthorizationChallenge) -> bool {
        challenge.kind() == DNS_01
    }
    async fn solve(&self, challenge: &AuthorizationChallenge) -> Result<(), SolverError> {
        log::info!(
            "publish TXT {} {:?} to prove control of {}",
            DnsDataExtractor::record_name(challenge),
            DnsDataExtractor::record_value(challenge),
            challenge.domain()
        );
        Ok(())
    }
    async fn cleanup(&self, challenge: &AuthorizationChallenge) -> Result<(), SolverError> {
        log::info!("TXT {} may be removed", DnsDataExtractor::record_name(challenge));
        Ok(())
    }
}
