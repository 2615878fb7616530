use super::{DnsError, DnsResolver};
use async_io::{Async, Timer};
use async_trait::async_trait;
use futures::future::{select, Either};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use ring::rand::SystemRandom;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

const BOOTSTRAP_NAME_SERVER: &str = "8.8.8.8";
const MAX_MESSAGE_LEN: usize = 4096;

/// How queries reach name servers and how name server host names become addresses.
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn lookup_host(&self, host: &str) -> Result<IpAddr, DnsError>;
    async fn exchange(&self, server: IpAddr, query: &[u8]) -> Result<Vec<u8>, DnsError>;
}

#[derive(Debug, Clone)]
pub struct UdpTransport {
    port: u16,
    timeout: Duration,
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpTransport {
    pub fn new() -> Self {
        Self {
            port: 53,
            timeout: Duration::from_secs(3),
        }
    }
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DnsTransport for UdpTransport {
    async fn lookup_host(&self, host: &str) -> Result<IpAddr, DnsError> {
        let host = host.trim_end_matches('.');
        let mut addrs = async_std::net::ToSocketAddrs::to_socket_addrs(&(host, self.port)).await?;
        addrs
            .find(SocketAddr::is_ipv4)
            .map(|addr| addr.ip())
            .ok_or_else(|| DnsError::NoAddress(host.to_string()))
    }

    async fn exchange(&self, server: IpAddr, query: &[u8]) -> Result<Vec<u8>, DnsError> {
        let local: SocketAddr = match server {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = Async::<UdpSocket>::bind(local)?;
        socket.send_to(query, SocketAddr::new(server, self.port)).await?;
        match select(Box::pin(socket.readable()), Timer::after(self.timeout)).await {
            Either::Left((readable, _)) => readable?,
            Either::Right(_) => return Err(DnsError::Timeout { server }),
        }
        let mut buf = vec![0u8; MAX_MESSAGE_LEN];
        let (len, _) = socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok(buf)
    }
}

/// Resolves TXT records by asking each authoritative name server directly.
///
/// The authoritative set is found by walking the name from the top-level
/// domain down, starting at a bootstrap server. A lookup only succeeds when
/// every authoritative server returns the same set of values.
pub struct RawDnsResolver<T: DnsTransport = UdpTransport> {
    transport: T,
    bootstrap: String,
    rng: SystemRandom,
}

impl RawDnsResolver<UdpTransport> {
    pub fn new() -> Self {
        Self::with_transport(UdpTransport::new())
    }
}

impl Default for RawDnsResolver<UdpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DnsTransport> RawDnsResolver<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            bootstrap: BOOTSTRAP_NAME_SERVER.to_string(),
            rng: SystemRandom::new(),
        }
    }
    pub fn bootstrap(mut self, name_server: impl ToString) -> Self {
        self.bootstrap = name_server.to_string();
        self
    }

    async fn address(&self, server: &str) -> Result<IpAddr, DnsError> {
        match server.parse::<IpAddr>() {
            Ok(ip) => Ok(ip),
            Err(_) => self.transport.lookup_host(server).await,
        }
    }

    async fn request(&self, server: IpAddr, name: &str, record_type: RecordType) -> Result<Message, DnsError> {
        let id = ring::rand::generate::<[u8; 2]>(&self.rng).map_err(|_| DnsError::Random)?.expose();
        let id = u16::from_be_bytes(id);
        let mut query = Message::new();
        query
            .set_id(id)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(Name::from_ascii(name)?, record_type));
        log::debug!("asking {} for {} {}", server, record_type, name);
        let response = Message::from_vec(&self.transport.exchange(server, &query.to_vec()?).await?)?;
        if response.id() != id {
            return Err(DnsError::IdMismatch);
        }
        if response.response_code() != ResponseCode::NoError {
            return Err(DnsError::ResponseCode {
                server,
                code: response.response_code().to_string(),
            });
        }
        Ok(response)
    }

    async fn delegation(&self, server: &str, domain: &str) -> Result<Vec<String>, DnsError> {
        let address = self.address(server).await?;
        let response = self.request(address, domain, RecordType::NS).await?;
        Ok(response
            .answers()
            .iter()
            .chain(response.name_servers())
            .filter_map(|record| match record.data() {
                Some(RData::NS(ns)) => Some(ns.0.to_ascii().trim_end_matches('.').to_string()),
                _ => None,
            })
            .collect())
    }

    /// Authoritative name servers of `domain`.
    ///
    /// Each suffix, shortest first, is looked up at the name servers found for
    /// its parent. Unreachable parents are skipped. When no delegation shows up
    /// for a suffix the parent's servers are kept.
    pub async fn name_servers(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        let labels: Vec<&str> = domain.trim_end_matches('.').split('.').filter(|l| !l.is_empty()).collect();
        let mut servers = vec![self.bootstrap.clone()];
        for start in (0..labels.len()).rev() {
            let suffix = labels[start..].join(".");
            let mut found: Vec<String> = Vec::new();
            for server in &servers {
                match self.delegation(server, &suffix).await {
                    Ok(names) => {
                        for name in names {
                            if !found.contains(&name) {
                                found.push(name);
                            }
                        }
                    }
                    Err(err) => log::warn!("name server {} could not resolve {}: {}", server, suffix, err),
                }
            }
            if !found.is_empty() {
                servers = found;
            }
        }
        Ok(servers)
    }
}

fn txt_values(records: &[Record]) -> Vec<String> {
    let mut entries: Vec<String> = records
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::TXT(txt)) => Some(txt.txt_data().iter().map(|data| String::from_utf8_lossy(data)).collect()),
            _ => None,
        })
        .collect();
    entries.sort();
    entries.dedup();
    entries
}

#[async_trait]
impl<T: DnsTransport> DnsResolver for RawDnsResolver<T> {
    async fn txt_entries(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for server in self.name_servers(domain).await? {
            let address = self.address(&server).await?;
            let response = self.request(address, domain, RecordType::TXT).await?;
            let entries = txt_values(response.answers());
            log::debug!("{} ({}) returned {:?} for {}", server, address, entries, domain);
            groups.insert(serde_json::to_string(&entries)?, entries);
        }
        if groups.len() != 1 {
            return Err(DnsError::NotPropagated {
                domain: domain.to_string(),
                groups: groups.len(),
            });
        }
        Ok(groups.into_values().next().unwrap_or_default())
    }
}
