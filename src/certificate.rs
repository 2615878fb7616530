use crate::key::KeyPair;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;

/// Subject of a certificate request. The common name is never repeated in the
/// subject alternative names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    common_name: String,
    country_name: Option<String>,
    state_or_province_name: Option<String>,
    locality_name: Option<String>,
    organization_name: Option<String>,
    organizational_unit_name: Option<String>,
    email_address: Option<String>,
    subject_alternative_names: Vec<String>,
}

impl DistinguishedName {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            country_name: None,
            state_or_province_name: None,
            locality_name: None,
            organization_name: None,
            organizational_unit_name: None,
            email_address: None,
            subject_alternative_names: Vec::new(),
        }
    }
    pub fn with_country_name(mut self, value: impl Into<String>) -> Self {
        self.country_name = Some(value.into());
        self
    }
    pub fn with_state_or_province_name(mut self, value: impl Into<String>) -> Self {
        self.state_or_province_name = Some(value.into());
        self
    }
    pub fn with_locality_name(mut self, value: impl Into<String>) -> Self {
        self.locality_name = Some(value.into());
        self
    }
    pub fn with_organization_name(mut self, value: impl Into<String>) -> Self {
        self.organization_name = Some(value.into());
        self
    }
    pub fn with_organizational_unit_name(mut self, value: impl Into<String>) -> Self {
        self.organizational_unit_name = Some(value.into());
        self
    }
    pub fn with_email_address(mut self, value: impl Into<String>) -> Self {
        self.email_address = Some(value.into());
        self
    }
    pub fn with_subject_alternative_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        for name in names {
            let name = name.into();
            if name != self.common_name && !self.subject_alternative_names.contains(&name) {
                self.subject_alternative_names.push(name);
            }
        }
        self
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }
    pub fn country_name(&self) -> Option<&str> {
        self.country_name.as_deref()
    }
    pub fn state_or_province_name(&self) -> Option<&str> {
        self.state_or_province_name.as_deref()
    }
    pub fn locality_name(&self) -> Option<&str> {
        self.locality_name.as_deref()
    }
    pub fn organization_name(&self) -> Option<&str> {
        self.organization_name.as_deref()
    }
    pub fn organizational_unit_name(&self) -> Option<&str> {
        self.organizational_unit_name.as_deref()
    }
    pub fn email_address(&self) -> Option<&str> {
        self.email_address.as_deref()
    }
    pub fn subject_alternative_names(&self) -> &[String] {
        &self.subject_alternative_names
    }

    /// Common name followed by every SAN, i.e. all names one order covers.
    pub fn domains(&self) -> Vec<String> {
        let mut domains = vec![self.common_name.clone()];
        domains.extend(self.subject_alternative_names.iter().cloned());
        domains
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    distinguished_name: DistinguishedName,
    key_pair: KeyPair,
}

impl CertificateRequest {
    pub fn new(distinguished_name: DistinguishedName, key_pair: KeyPair) -> Self {
        Self {
            distinguished_name,
            key_pair,
        }
    }
    pub fn distinguished_name(&self) -> &DistinguishedName {
        &self.distinguished_name
    }
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }
}

/// A PEM certificate and the chain of its issuers, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pem: String,
    issuer: Option<Box<Certificate>>,
}

impl Certificate {
    pub fn new(pem: impl Into<String>, issuer: Option<Certificate>) -> Self {
        Self {
            pem: pem.into(),
            issuer: issuer.map(Box::new),
        }
    }

    /// Builds the chain from a bundle whose first block is the leaf. Every
    /// block must be a `CERTIFICATE`.
    pub fn from_pem_bundle(bundle: &str) -> Result<Self, CertParseError> {
        let pems = pem::parse_many(bundle)?;
        if let Some(block) = pems.iter().find(|p| p.tag() != "CERTIFICATE") {
            return Err(CertParseError::UnexpectedBlock(block.tag().to_string()));
        }
        let encode = |p: &pem::Pem| pem::encode_config(p, pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF));
        let chain = pems.iter().rev().fold(None, |issuer, p| Some(Certificate::new(encode(p), issuer)));
        chain.ok_or(CertParseError::NoCertificate)
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }
    pub fn issuer(&self) -> Option<&Certificate> {
        self.issuer.as_deref()
    }
    pub fn chain(&self) -> Chain<'_> {
        Chain { next: Some(self) }
    }
    /// Top-most certificate of the chain.
    pub fn root(&self) -> &Certificate {
        self.chain().last().unwrap_or(self)
    }
    pub fn full_chain_pem(&self) -> String {
        self.chain().map(Certificate::pem).collect::<Vec<_>>().join("\n")
    }
    pub fn der(&self) -> Result<Vec<u8>, CertParseError> {
        Ok(pem::parse(&self.pem)?.into_contents())
    }

    pub fn parse(&self) -> Result<ParsedCertificate, CertParseError> {
        let der = self.der()?;
        let (_, x509) = parse_x509_certificate(&der).map_err(CertParseError::X509)?;
        let common_name = |name: &x509_parser::x509::X509Name| {
            name.iter_common_name().next().and_then(|cn| cn.as_str().ok()).map(str::to_string)
        };
        let timestamp = |time: x509_parser::time::ASN1Time| {
            Utc.timestamp_opt(time.timestamp(), 0).single().ok_or(CertParseError::InvalidValidity)
        };
        let subject_alternative_names = x509
            .subject_alternative_name()
            .ok()
            .flatten()
            .map(|san| {
                san.value
                    .general_names
                    .iter()
                    .filter_map(|name| match name {
                        GeneralName::DNSName(name) => Some(name.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let validity = x509.validity();
        Ok(ParsedCertificate {
            subject: common_name(x509.subject()),
            issuer: common_name(x509.issuer()),
            self_signed: x509.subject().as_raw() == x509.issuer().as_raw(),
            valid_from: timestamp(validity.not_before)?,
            valid_to: timestamp(validity.not_after)?,
            serial_number: x509.tbs_certificate.raw_serial().iter().map(|b| format!("{:02X}", b)).collect(),
            subject_alternative_names,
        })
    }
}

pub struct Chain<'a> {
    next: Option<&'a Certificate>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a Certificate;
    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.issuer();
        Some(current)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub self_signed: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub serial_number: String,
    pub subject_alternative_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateResponse {
    request: CertificateRequest,
    certificate: Certificate,
}

impl CertificateResponse {
    pub fn new(request: CertificateRequest, certificate: Certificate) -> Self {
        Self { request, certificate }
    }
    pub fn certificate_request(&self) -> &CertificateRequest {
        &self.request
    }
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevocationReason {
    #[default]
    Unspecified,
    KeyCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
}

impl RevocationReason {
    /// CRLReason code, RFC 5280 section 5.3.1.
    pub fn code(self) -> u8 {
        match self {
            RevocationReason::Unspecified => 0,
            RevocationReason::KeyCompromise => 1,
            RevocationReason::AffiliationChanged => 3,
            RevocationReason::Superseded => 4,
            RevocationReason::CessationOfOperation => 5,
        }
    }
    pub fn name(self) -> &'static str {
        match self {
            RevocationReason::Unspecified => "unspecified",
            RevocationReason::KeyCompromise => "key-compromise",
            RevocationReason::AffiliationChanged => "affiliation-changed",
            RevocationReason::Superseded => "superseded",
            RevocationReason::CessationOfOperation => "cessation-of-operation",
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RevocationReason {
    type Err = CertParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            RevocationReason::Unspecified,
            RevocationReason::KeyCompromise,
            RevocationReason::AffiliationChanged,
            RevocationReason::Superseded,
            RevocationReason::CessationOfOperation,
        ]
        .into_iter()
        .find(|reason| reason.name() == s || reason.code().to_string() == s)
        .ok_or_else(|| CertParseError::UnknownRevocationReason(s.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum CertParseError {
    #[error("X509 parsing error: {0}")]
    X509(x509_parser::nom::Err<x509_parser::error::X509Error>),
    #[error("pem error: {0}")]
    Pem(#[from] pem::PemError),
    #[error("bundle contains no PEM certificate")]
    NoCertificate,
    #[error("unexpected {0:?} block in certificate bundle")]
    UnexpectedBlock(String),
    #[error("certificate validity is out of range")]
    InvalidValidity,
    #[error("unknown revocation reason {0:?}")]
    UnknownRevocationReason(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAF: &str = include_str!("../tests/data/leaf.pem");
    const ROOT: &str = include_str!("../tests/data/root.pem");

    #[test]
    fn sans_exclude_common_name_and_duplicates() {
        let dn = DistinguishedName::new("acmephp.com").with_subject_alternative_names([
            "www.acmephp.com",
            "acmephp.com",
            "www.acmephp.com",
            "api.acmephp.com",
        ]);
        assert_eq!(dn.subject_alternative_names(), ["www.acmephp.com", "api.acmephp.com"]);
        assert_eq!(dn.domains(), ["acmephp.com", "www.acmephp.com", "api.acmephp.com"]);
    }

    #[test]
    fn optional_fields_are_set_by_the_builder() {
        let dn = DistinguishedName::new("acmephp.com")
            .with_country_name("FR")
            .with_locality_name("Paris")
            .with_email_address("admin@acmephp.com");
        assert_eq!(dn.common_name(), "acmephp.com");
        assert_eq!(dn.country_name(), Some("FR"));
        assert_eq!(dn.locality_name(), Some("Paris"));
        assert_eq!(dn.email_address(), Some("admin@acmephp.com"));
        assert_eq!(dn.organization_name(), None);
        assert!(dn.subject_alternative_names().is_empty());
    }

    #[test]
    fn bundle_is_linked_leaf_first() {
        let bundle = format!("{}\n{}", LEAF.trim(), ROOT.trim());
        let certificate = Certificate::from_pem_bundle(&bundle).unwrap();
        assert_eq!(certificate.pem().trim(), LEAF.trim());
        let issuer = certificate.issuer().unwrap();
        assert_eq!(issuer.pem().trim(), ROOT.trim());
        assert!(issuer.issuer().is_none());
        assert_eq!(certificate.chain().count(), 2);
        assert_eq!(certificate.root().pem(), issuer.pem());
    }

    #[test]
    fn bundle_without_certificates_is_rejected() {
        assert!(matches!(Certificate::from_pem_bundle("\n\n"), Err(CertParseError::NoCertificate)));
    }

    #[test]
    fn bundle_with_a_key_block_is_rejected() {
        let bundle = format!("{}\n\n{}", LEAF.trim(), include_str!("../tests/data/p256.pem"));
        assert!(matches!(
            Certificate::from_pem_bundle(&bundle),
            Err(CertParseError::UnexpectedBlock(tag)) if tag == "PRIVATE KEY"
        ));
    }

    #[test]
    fn parsed_certificate_exposes_names_and_validity() {
        let parsed = Certificate::new(LEAF, None).parse().unwrap();
        assert_eq!(parsed.subject.as_deref(), Some("acmephp.com"));
        assert_eq!(parsed.issuer.as_deref(), Some("Acme Test Root"));
        assert!(!parsed.self_signed);
        assert_eq!(parsed.subject_alternative_names, ["acmephp.com", "www.acmephp.com"]);
        assert!(parsed.valid_from < parsed.valid_to);
        assert_eq!(parsed.serial_number, "24B7097F43B960564F3F452FD10FB55371A98AB1");

        let root = Certificate::new(ROOT, None).parse().unwrap();
        assert!(root.self_signed);
    }

    #[test]
    fn revocation_reasons_parse_by_name_or_code() {
        assert_eq!("key-compromise".parse::<RevocationReason>().unwrap(), RevocationReason::KeyCompromise);
        assert_eq!("4".parse::<RevocationReason>().unwrap(), RevocationReason::Superseded);
        assert_eq!(RevocationReason::default().code(), 0);
        assert!("2".parse::<RevocationReason>().is_err());
    }
}
