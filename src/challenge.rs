use crate::acme::Status;
use crate::jose::key_authorization_sha256;
use base64::prelude::*;
use std::collections::BTreeMap;

pub const HTTP_01: &str = "http-01";
pub const DNS_01: &str = "dns-01";
pub const TLS_ALPN_01: &str = "tls-alpn-01";

/// One challenge offered by the CA for one domain of an order.
///
/// Instances are snapshots: a status change is observed by reloading the
/// challenge through the client, which returns a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationChallenge {
    domain: String,
    status: Status,
    kind: String,
    url: String,
    token: String,
    payload: String,
    error: Option<String>,
}

impl AuthorizationChallenge {
    pub fn new(
        domain: impl Into<String>,
        status: Status,
        kind: impl Into<String>,
        url: impl Into<String>,
        token: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            status,
            kind: kind.into(),
            url: url.into(),
            token: token.into(),
            payload: payload.into(),
            error: None,
        }
    }
    pub(crate) fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
    pub fn status(&self) -> &Status {
        &self.status
    }
    /// Challenge type such as `http-01`.
    pub fn kind(&self) -> &str {
        &self.kind
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn token(&self) -> &str {
        &self.token
    }
    /// Key authorization, `token.thumbprint`.
    pub fn payload(&self) -> &str {
        &self.payload
    }
    /// Problem detail reported by the CA for an invalid challenge.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
    pub fn is_pending(&self) -> bool {
        matches!(self.status, Status::Pending | Status::Processing)
    }
    pub fn is_valid(&self) -> bool {
        self.status == Status::Valid
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateOrder {
    challenges: BTreeMap<String, Vec<AuthorizationChallenge>>,
    order_endpoint: String,
}

impl CertificateOrder {
    pub fn new(challenges: BTreeMap<String, Vec<AuthorizationChallenge>>, order_endpoint: impl Into<String>) -> Self {
        Self {
            challenges,
            order_endpoint: order_endpoint.into(),
        }
    }
    pub fn challenges(&self) -> &BTreeMap<String, Vec<AuthorizationChallenge>> {
        &self.challenges
    }
    pub fn into_challenges(self) -> BTreeMap<String, Vec<AuthorizationChallenge>> {
        self.challenges
    }
    pub fn challenges_for(&self, domain: &str) -> &[AuthorizationChallenge] {
        self.challenges.get(domain).map(Vec::as_slice).unwrap_or_default()
    }
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.challenges.keys().map(String::as_str)
    }
    /// URL of the order resource, polled during finalization.
    pub fn order_endpoint(&self) -> &str {
        &self.order_endpoint
    }
}

/// What has to be served over plain HTTP to satisfy an `http-01` challenge.
pub struct HttpDataExtractor;

impl HttpDataExtractor {
    pub fn check_url(challenge: &AuthorizationChallenge) -> String {
        format!("http://{}{}", challenge.domain(), Self::check_path(challenge))
    }
    pub fn check_path(challenge: &AuthorizationChallenge) -> String {
        format!("/.well-known/acme-challenge/{}", challenge.token())
    }
    pub fn check_content(challenge: &AuthorizationChallenge) -> &str {
        challenge.payload()
    }
}

/// What has to be published in DNS to satisfy a `dns-01` challenge.
pub struct DnsDataExtractor;

impl DnsDataExtractor {
    pub fn record_name(challenge: &AuthorizationChallenge) -> String {
        let domain = challenge.domain();
        let domain = domain.strip_prefix("*.").unwrap_or(domain);
        format!("_acme-challenge.{}.", domain.trim_end_matches('.'))
    }
    pub fn record_value(challenge: &AuthorizationChallenge) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(key_authorization_sha256(challenge.payload()))
    }
}
