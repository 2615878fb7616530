//! acme-core is an async ACME ([RFC 8555](https://www.rfc-editor.org/rfc/rfc8555)) client engine.
//! It signs requests, drives orders through their authorization and finalization states, checks
//! challenges locally before the CA does and confirms DNS-01 records on every authoritative name
//! server.
//!
//! To use acme-core add the following lines to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! acme-core = "*"
//! ```
//!
//! ## High-level API
//!
//! [issue] runs a complete issuance: order, challenge selection, solving, local validation,
//! CA verification, cleanup and finalization.
//!
//! ```rust,ignore
//! use acme_core::*;
//!
//! #[async_std::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let account_key = KeyPair::generate(KeyType::EcdsaP256)?;
//!     let mut client = AcmeConfig::new()
//!         .contact_push("mailto:admin@example.com".to_string())
//!         .client(account_key.private_key().clone())?;
//!     client.register_account(None, None).await?;
//!
//!     let request = CertificateRequest::new(
//!         DistinguishedName::new("example.com").with_subject_alternative_names(["www.example.com"]),
//!         KeyPair::generate(KeyType::EcdsaP256)?,
//!     );
//!     let solver = WebrootHttpSolver::new("/var/www/html");
//!     let validator = validator::default_validator()?;
//!     let response = issue(&mut client, &request, &solver, &validator).await?;
//!     println!("{}", response.certificate().full_chain_pem());
//!     Ok(())
//! }
//! ```
//!
//! Note that the default configuration uses the let's encrypt staging directory. The production
//! directory imposes strict rate limits, which are easily exhausted accidentally during testing
//! and development.
//!
//! ## The acme module
//!
//! [AcmeClient] exposes every step individually (`request_order`, `challenge_authorization`,
//! `finalize_order`, `revoke_certificate`, ...). One client holds the replay nonce of its last
//! response, so its methods take `&mut self` and a client must not be shared between concurrent
//! flows.
//!
//! ## DNS propagation
//!
//! With the default `raw-dns` feature, DNS-01 records are looked up directly on every
//! authoritative name server and only accepted once all of them agree. Without it, the system
//! resolver is used.

pub mod acme;
pub mod certificate;
pub mod challenge;
mod config;
mod csr;
pub mod dns;
mod https_helper;
pub mod jose;
mod key;
pub mod problem;
mod registry;
mod simple;
pub mod solver;
pub mod validator;

pub use acme::{AcmeClient, AcmeError, OrderError};
pub use certificate::{Certificate, CertificateRequest, CertificateResponse, DistinguishedName, RevocationReason};
pub use challenge::{AuthorizationChallenge, CertificateOrder, DnsDataExtractor, HttpDataExtractor};
pub use config::AcmeConfig;
pub use csr::{csr_der, csr_pem};
pub use https_helper::{HttpClient, HttpsRequestError, WebClient};
pub use jose::{ExternalAccount, RequestSigner};
pub use key::{KeyPair, KeyType, PrivateKey, PublicKey};
pub use registry::{Registry, RegistryError};
pub use simple::issue;
pub use solver::{SimpleDnsSolver, SimpleHttpSolver, Solver, WebrootHttpSolver};
pub use validator::Validator;
