//! TXT lookups used to confirm that DNS-01 records are published.
//!
//! [RawDnsResolver] asks every authoritative name server of a record directly
//! and only answers when all of them agree. [SimpleDnsResolver] goes through
//! the system resolver and is used when the `raw-dns` feature is disabled.

#[cfg(feature = "raw-dns")]
mod raw;
mod simple;

#[cfg(feature = "raw-dns")]
pub use raw::{DnsTransport, RawDnsResolver, UdpTransport};
pub use simple::SimpleDnsResolver;

use async_trait::async_trait;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;

#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Sorted, de-duplicated TXT values published at `domain`.
    async fn txt_entries(&self, domain: &str) -> Result<Vec<String>, DnsError>;
}

#[async_trait]
impl<T: DnsResolver + ?Sized> DnsResolver for Arc<T> {
    async fn txt_entries(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        (**self).txt_entries(domain).await
    }
}

#[async_trait]
impl<T: DnsResolver + ?Sized> DnsResolver for Box<T> {
    async fn txt_entries(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        (**self).txt_entries(domain).await
    }
}

#[cfg(feature = "raw-dns")]
pub fn default_resolver() -> Box<dyn DnsResolver> {
    Box::new(RawDnsResolver::new())
}

#[cfg(not(feature = "raw-dns"))]
pub fn default_resolver() -> Box<dyn DnsResolver> {
    Box::new(SimpleDnsResolver)
}

#[derive(Error, Debug)]
pub enum DnsError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("no response from {server} in time")]
    Timeout { server: IpAddr },
    #[cfg(feature = "raw-dns")]
    #[error("dns message error: {0}")]
    Proto(#[from] hickory_proto::error::ProtoError),
    #[error("{server} answered with response code {code}")]
    ResponseCode { server: IpAddr, code: String },
    #[error("response id does not match the query")]
    IdMismatch,
    #[error("no address found for {0}")]
    NoAddress(String),
    #[error("TXT records of {domain} are not fully propagated, name servers returned {groups} different sets")]
    NotPropagated { domain: String, groups: usize },
    #[error("system resolver error: {0}")]
    Resolve(#[from] hickory_resolver::error::ResolveError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not generate a query id")]
    Random,
}
