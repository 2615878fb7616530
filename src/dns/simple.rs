use super::{DnsError, DnsResolver};
use async_trait::async_trait;
use hickory_resolver::Resolver;

/// TXT lookups through the resolvers configured on this host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleDnsResolver;

#[async_trait]
impl DnsResolver for SimpleDnsResolver {
    async fn txt_entries(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        let domain = domain.to_string();
        async_std::task::spawn_blocking(move || -> Result<Vec<String>, DnsError> {
            let resolver = Resolver::from_system_conf()?;
            let lookup = resolver.txt_lookup(domain.as_str())?;
            let mut entries: Vec<String> = lookup
                .iter()
                .map(|txt| txt.txt_data().iter().map(|data| String::from_utf8_lossy(data)).collect())
                .collect();
            entries.sort();
            entries.dedup();
            log::debug!("system resolver returned {:?} for {}", entries, domain);
            Ok(entries)
        })
        .await
    }
}
