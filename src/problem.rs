use serde::Deserialize;
use std::fmt;
use thiserror::Error;

const SUMMARY_LEN: usize = 120;

/// RFC 7807 problem document as returned by ACME servers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Problem {
    #[serde(rename = "type", default)]
    pub typ: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    AccountDoesNotExist,
    AlreadyRevoked,
    BadCsr,
    BadNonce,
    BadPublicKey,
    BadRevocationReason,
    BadSignatureAlgorithm,
    Caa,
    Compound,
    Connection,
    Dns,
    ExternalAccountRequired,
    IncorrectResponse,
    InvalidContact,
    Malformed,
    OrderNotReady,
    RateLimited,
    RejectedIdentifier,
    ServerInternal,
    Tls,
    Unauthorized,
    UnknownHost,
    UnsupportedContact,
    UnsupportedIdentifier,
    UserActionRequired,
}

impl ProblemKind {
    const ALL: [ProblemKind; 25] = [
        ProblemKind::AccountDoesNotExist,
        ProblemKind::AlreadyRevoked,
        ProblemKind::BadCsr,
        ProblemKind::BadNonce,
        ProblemKind::BadPublicKey,
        ProblemKind::BadRevocationReason,
        ProblemKind::BadSignatureAlgorithm,
        ProblemKind::Caa,
        ProblemKind::Compound,
        ProblemKind::Connection,
        ProblemKind::Dns,
        ProblemKind::ExternalAccountRequired,
        ProblemKind::IncorrectResponse,
        ProblemKind::InvalidContact,
        ProblemKind::Malformed,
        ProblemKind::OrderNotReady,
        ProblemKind::RateLimited,
        ProblemKind::RejectedIdentifier,
        ProblemKind::ServerInternal,
        ProblemKind::Tls,
        ProblemKind::Unauthorized,
        ProblemKind::UnknownHost,
        ProblemKind::UnsupportedContact,
        ProblemKind::UnsupportedIdentifier,
        ProblemKind::UserActionRequired,
    ];

    /// Suffix of the `urn:ietf:params:acme:error:` type URN.
    pub fn name(self) -> &'static str {
        match self {
            ProblemKind::AccountDoesNotExist => "accountDoesNotExist",
            ProblemKind::AlreadyRevoked => "alreadyRevoked",
            ProblemKind::BadCsr => "badCSR",
            ProblemKind::BadNonce => "badNonce",
            ProblemKind::BadPublicKey => "badPublicKey",
            ProblemKind::BadRevocationReason => "badRevocationReason",
            ProblemKind::BadSignatureAlgorithm => "badSignatureAlgorithm",
            ProblemKind::Caa => "caa",
            ProblemKind::Compound => "compound",
            ProblemKind::Connection => "connection",
            ProblemKind::Dns => "dns",
            ProblemKind::ExternalAccountRequired => "externalAccountRequired",
            ProblemKind::IncorrectResponse => "incorrectResponse",
            ProblemKind::InvalidContact => "invalidContact",
            ProblemKind::Malformed => "malformed",
            ProblemKind::OrderNotReady => "orderNotReady",
            ProblemKind::RateLimited => "rateLimited",
            ProblemKind::RejectedIdentifier => "rejectedIdentifier",
            ProblemKind::ServerInternal => "serverInternal",
            ProblemKind::Tls => "tls",
            ProblemKind::Unauthorized => "unauthorized",
            ProblemKind::UnknownHost => "unknownHost",
            ProblemKind::UnsupportedContact => "unsupportedContact",
            ProblemKind::UnsupportedIdentifier => "unsupportedIdentifier",
            ProblemKind::UserActionRequired => "userActionRequired",
        }
    }

    /// Accepts both the RFC 8555 and the pre-standard `urn:acme:error:` namespace.
    pub fn from_type(typ: &str) -> Option<Self> {
        let suffix = typ
            .strip_prefix("urn:ietf:params:acme:error:")
            .or_else(|| typ.strip_prefix("urn:acme:error:"))?;
        Self::ALL.into_iter().find(|kind| kind.name() == suffix)
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    #[error("{kind} (HTTP {status}): {detail}")]
    Problem { kind: ProblemKind, status: u16, detail: String },
    #[error("unexpected response (HTTP {status}): {summary}")]
    Unexpected { status: u16, summary: String },
}

impl ServerError {
    pub fn from_response(status: u16, body: &str) -> Self {
        let problem = serde_json::from_str::<Problem>(body).ok();
        let kind = problem.as_ref().and_then(|p| p.typ.as_deref()).and_then(ProblemKind::from_type);
        match (kind, problem) {
            (Some(kind), Some(problem)) => ServerError::Problem {
                kind,
                status,
                detail: problem.detail.unwrap_or_default(),
            },
            _ => ServerError::Unexpected {
                status,
                summary: summarize(body),
            },
        }
    }

    pub fn kind(&self) -> Option<ProblemKind> {
        match self {
            ServerError::Problem { kind, .. } => Some(*kind),
            ServerError::Unexpected { .. } => None,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            ServerError::Problem { status, .. } | ServerError::Unexpected { status, .. } => *status,
        }
    }

    pub fn is_bad_nonce(&self) -> bool {
        self.kind() == Some(ProblemKind::BadNonce)
    }
}

pub(crate) fn summarize(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(SUMMARY_LEN) {
        Some((end, _)) => format!("{} (truncated...)", &body[..end]),
        None => body.to_string(),
    }
}
