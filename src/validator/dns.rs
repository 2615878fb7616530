use super::{ValidationError, Validator};
use crate::challenge::{AuthorizationChallenge, DnsDataExtractor, DNS_01};
use crate::dns::{default_resolver, DnsResolver};
use crate::solver::Solver;
use async_trait::async_trait;

/// Looks for the hashed key authorization among the TXT values of
/// `_acme-challenge.<domain>.`.
pub struct DnsValidator<R: DnsResolver = Box<dyn DnsResolver>> {
    resolver: R,
}

impl DnsValidator<Box<dyn DnsResolver>> {
    pub fn new() -> Self {
        Self::with_resolver(default_resolver())
    }
}

impl Default for DnsValidator<Box<dyn DnsResolver>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: DnsResolver> DnsValidator<R> {
    pub fn with_resolver(resolver: R) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl<R: DnsResolver> Validator for DnsValidator<R> {
    fn supports(&self, challenge: &AuthorizationChallenge, _solver: &dyn Solver) -> bool {
        challenge.kind() == DNS_01
    }

    async fn is_valid(&self, challenge: &AuthorizationChallenge, _solver: &dyn Solver) -> Result<bool, ValidationError> {
        let name = DnsDataExtractor::record_name(challenge);
        let value = DnsDataExtractor::record_value(challenge);
        match self.resolver.txt_entries(&name).await {
            Ok(entries) => Ok(entries.contains(&value)),
            Err(err) => {
                log::warn!("TXT lookup of {} failed: {}", name, err);
                Ok(false)
            }
        }
    }
}
