use crate::key::PrivateKey;
use base64::prelude::*;
use p521::elliptic_curve::sec1::ToEncodedPoint;
use p521::pkcs8::DecodePrivateKey;
use ring::digest::{digest, Digest, SHA256};
use ring::hmac;
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, EcdsaSigningAlgorithm, KeyPair, RsaKeyPair, RsaPublicKeyComponents, ECDSA_P256_SHA256_ASN1_SIGNING,
    ECDSA_P384_SHA384_ASN1_SIGNING, RSA_PKCS1_SHA256,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Payload of a POST-as-GET request.
pub const POST_AS_GET: &str = "";
/// Payload used to ask the CA to validate a challenge.
pub const EMPTY_OBJECT: &str = "{}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Rs256,
    Es256,
    Es384,
    Es512,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Rs256 => "RS256",
            Algorithm::Es256 => "ES256",
            Algorithm::Es384 => "ES384",
            Algorithm::Es512 => "ES512",
        }
    }

    /// Length of the raw `r || s` signature for EC algorithms.
    pub fn signature_len(self) -> Option<usize> {
        match self {
            Algorithm::Rs256 => None,
            Algorithm::Es256 => Some(64),
            Algorithm::Es384 => Some(96),
            Algorithm::Es512 => Some(132),
        }
    }

    fn from_curve_bits(bits: usize) -> Result<Self, JoseError> {
        match bits {
            256 => Ok(Algorithm::Es256),
            384 => Ok(Algorithm::Es384),
            521 => Ok(Algorithm::Es512),
            bits => Err(JoseError::UnsupportedCurve(bits)),
        }
    }

    fn curve(self) -> &'static str {
        match self {
            Algorithm::Es384 => "P-384",
            Algorithm::Es512 => "P-521",
            _ => "P-256",
        }
    }
}

/// Canonical JWK. Field order is part of the thumbprint and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Jwk {
    Rsa { e: String, kty: &'static str, n: String },
    Ec { crv: &'static str, kty: &'static str, x: String, y: String },
}

impl Jwk {
    fn ec(algorithm: Algorithm, uncompressed_point: &[u8]) -> Result<Self, JoseError> {
        let coordinates = uncompressed_point.get(1..).ok_or(JoseError::MalformedKey)?;
        if coordinates.len() % 2 != 0 {
            return Err(JoseError::MalformedKey);
        }
        let (x, y) = coordinates.split_at(coordinates.len() / 2);
        Ok(Jwk::Ec {
            crv: algorithm.curve(),
            kty: "EC",
            x: BASE64_URL_SAFE_NO_PAD.encode(x),
            y: BASE64_URL_SAFE_NO_PAD.encode(y),
        })
    }

    /// base64url(SHA-256(canonical JSON)), RFC 7638.
    pub fn thumb_sha256_base64(&self) -> Result<String, JoseError> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(digest(&SHA256, &json)))
    }
}

/// A decoded private key. Never stored: acquired per signature and dropped
/// right after.
enum SigningKey {
    Rsa(RsaKeyPair),
    Ecdsa(EcdsaKeyPair, Algorithm),
    P521(p521::SecretKey),
}

impl SigningKey {
    fn decode(key: &PrivateKey) -> Result<Self, JoseError> {
        let pem = key.der()?;
        match pem.tag() {
            "RSA PRIVATE KEY" => Ok(SigningKey::Rsa(RsaKeyPair::from_der(pem.contents())?)),
            "PRIVATE KEY" => Self::from_pkcs8(pem.contents()),
            tag => Err(JoseError::UnsupportedKey(tag.to_string())),
        }
    }

    fn from_pkcs8(der: &[u8]) -> Result<Self, JoseError> {
        if let Ok(key) = RsaKeyPair::from_pkcs8(der) {
            return Ok(SigningKey::Rsa(key));
        }
        let rng = SystemRandom::new();
        let curves: [(&'static EcdsaSigningAlgorithm, usize); 2] =
            [(&ECDSA_P256_SHA256_ASN1_SIGNING, 256), (&ECDSA_P384_SHA384_ASN1_SIGNING, 384)];
        for (alg, bits) in curves {
            if let Ok(key) = EcdsaKeyPair::from_pkcs8(alg, der, &rng) {
                return Ok(SigningKey::Ecdsa(key, Algorithm::from_curve_bits(bits)?));
            }
        }
        match p521::SecretKey::from_pkcs8_der(der) {
            Ok(key) => Ok(SigningKey::P521(key)),
            Err(_) => Err(JoseError::UnsupportedKey("PKCS#8 key of unknown type".to_string())),
        }
    }

    fn algorithm(&self) -> Algorithm {
        match self {
            SigningKey::Rsa(_) => Algorithm::Rs256,
            SigningKey::Ecdsa(_, algorithm) => *algorithm,
            SigningKey::P521(_) => Algorithm::Es512,
        }
    }

    fn jwk(&self) -> Result<Jwk, JoseError> {
        match self {
            SigningKey::Rsa(key) => {
                let components = RsaPublicKeyComponents::<Vec<u8>>::from(key.public());
                Ok(Jwk::Rsa {
                    e: BASE64_URL_SAFE_NO_PAD.encode(&components.e),
                    kty: "RSA",
                    n: BASE64_URL_SAFE_NO_PAD.encode(&components.n),
                })
            }
            SigningKey::Ecdsa(key, algorithm) => Jwk::ec(*algorithm, key.public_key().as_ref()),
            SigningKey::P521(key) => {
                let point = key.public_key().to_encoded_point(false);
                Jwk::ec(Algorithm::Es512, point.as_bytes())
            }
        }
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, JoseError> {
        let rng = SystemRandom::new();
        match self {
            SigningKey::Rsa(key) => {
                let mut signature = vec![0; key.public().modulus_len()];
                key.sign(&RSA_PKCS1_SHA256, &rng, message, &mut signature)?;
                Ok(signature)
            }
            SigningKey::Ecdsa(key, algorithm) => {
                let der = key.sign(&rng, message)?;
                let len = algorithm.signature_len().ok_or(JoseError::MalformedSignature)?;
                der_to_fixed(der.as_ref(), len)
            }
            SigningKey::P521(key) => {
                use p521::ecdsa::signature::Signer;
                let signing_key = p521::ecdsa::SigningKey::from_slice(&key.to_bytes()).map_err(|_| JoseError::MalformedKey)?;
                let signature: p521::ecdsa::Signature = signing_key.try_sign(message).map_err(|_| JoseError::Crypto)?;
                Ok(signature.to_bytes().to_vec())
            }
        }
    }
}

/// Converts an ASN.1 DER ECDSA signature (SEQUENCE of two INTEGERs) into the
/// fixed width `r || s` form JWS requires.
pub(crate) fn der_to_fixed(der: &[u8], len: usize) -> Result<Vec<u8>, JoseError> {
    let (sequence, rest) = read_tlv(der, 0x30)?;
    if !rest.is_empty() {
        return Err(JoseError::MalformedSignature);
    }
    let (r, rest) = read_tlv(sequence, 0x02)?;
    let (s, rest) = read_tlv(rest, 0x02)?;
    if !rest.is_empty() {
        return Err(JoseError::MalformedSignature);
    }
    let half = len / 2;
    let mut fixed = Vec::with_capacity(len);
    for integer in [r, s] {
        let first = integer.iter().position(|b| *b != 0).unwrap_or(integer.len());
        let integer = &integer[first..];
        if integer.len() > half {
            return Err(JoseError::MalformedSignature);
        }
        fixed.resize(fixed.len() + half - integer.len(), 0);
        fixed.extend_from_slice(integer);
    }
    Ok(fixed)
}

fn read_tlv(input: &[u8], tag: u8) -> Result<(&[u8], &[u8]), JoseError> {
    let (&actual, rest) = input.split_first().ok_or(JoseError::MalformedSignature)?;
    if actual != tag {
        return Err(JoseError::MalformedSignature);
    }
    let (&first, rest) = rest.split_first().ok_or(JoseError::MalformedSignature)?;
    let (len, rest) = if first < 0x80 {
        (first as usize, rest)
    } else {
        let octets = (first & 0x7f) as usize;
        if octets == 0 || octets > 2 || rest.len() < octets {
            return Err(JoseError::MalformedSignature);
        }
        let len = rest[..octets].iter().fold(0usize, |len, b| len << 8 | *b as usize);
        (len, &rest[octets..])
    };
    if rest.len() < len {
        return Err(JoseError::MalformedSignature);
    }
    Ok(rest.split_at(len))
}

/// Credentials for External Account Binding, issued out of band by the CA.
#[derive(Clone, PartialEq, Eq)]
pub struct ExternalAccount {
    id: String,
    hmac_key: String,
}

impl ExternalAccount {
    pub fn new(id: impl Into<String>, hmac_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hmac_key: hmac_key.into(),
        }
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn hmac_key(&self) -> &str {
        &self.hmac_key
    }
}

impl fmt::Debug for ExternalAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalAccount").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Builds the signed JWS bodies of every ACME request for one account key.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    key: PrivateKey,
    algorithm: Algorithm,
    jwk: Jwk,
}

impl RequestSigner {
    pub fn new(key: PrivateKey) -> Result<Self, JoseError> {
        let signing_key = SigningKey::decode(&key)?;
        let algorithm = signing_key.algorithm();
        let jwk = signing_key.jwk()?;
        Ok(Self { key, algorithm, jwk })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    pub fn key_authorization(&self, token: &str) -> Result<String, JoseError> {
        Ok(format!("{}.{}", token, self.jwk.thumb_sha256_base64()?))
    }

    /// Signs with the embedded JWK. Only for requests made before the account
    /// URL is known.
    pub fn sign_jwk(&self, url: &str, nonce: &str, payload: &str) -> Result<String, JoseError> {
        self.sign(Some(&self.jwk), None, url, nonce, payload)
    }

    pub fn sign_kid(&self, kid: &str, url: &str, nonce: &str, payload: &str) -> Result<String, JoseError> {
        self.sign(None, Some(kid), url, nonce, payload)
    }

    fn sign(&self, jwk: Option<&Jwk>, kid: Option<&str>, url: &str, nonce: &str, payload: &str) -> Result<String, JoseError> {
        let protected = Protected {
            alg: self.algorithm.name(),
            jwk,
            kid,
            nonce,
            url,
        };
        let protected = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&protected)?);
        let payload = BASE64_URL_SAFE_NO_PAD.encode(payload);
        let combined = format!("{}.{}", &protected, &payload);
        let signature = SigningKey::decode(&self.key)?.sign(combined.as_bytes())?;
        let body = Body {
            protected,
            payload,
            signature: BASE64_URL_SAFE_NO_PAD.encode(signature),
        };
        Ok(serde_json::to_string(&body)?)
    }

    /// The `externalAccountBinding` object of a newAccount request.
    pub fn external_account_binding(&self, account: &ExternalAccount, url: &str) -> Result<serde_json::Value, JoseError> {
        let key = BASE64_URL_SAFE_NO_PAD
            .decode(account.hmac_key.trim_end_matches('='))
            .map_err(|_| JoseError::MalformedHmacKey)?;
        let protected = EabProtected {
            alg: "HS256",
            kid: &account.id,
            url,
        };
        let protected = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&protected)?);
        let payload = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(&self.jwk)?);
        let key = hmac::Key::new(hmac::HMAC_SHA256, &key);
        let tag = hmac::sign(&key, format!("{}.{}", protected, payload).as_bytes());
        Ok(serde_json::to_value(Body {
            protected,
            payload,
            signature: BASE64_URL_SAFE_NO_PAD.encode(tag.as_ref()),
        })?)
    }
}

/// SHA-256 of a key authorization, as published in DNS-01 TXT records.
pub fn key_authorization_sha256(key_authorization: &str) -> Digest {
    digest(&SHA256, key_authorization.as_bytes())
}

#[derive(Serialize)]
struct Body {
    protected: String,
    payload: String,
    signature: String,
}

#[derive(Serialize)]
struct Protected<'a> {
    alg: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<&'a Jwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
    nonce: &'a str,
    url: &'a str,
}

#[derive(Serialize)]
struct EabProtected<'a> {
    alg: &'static str,
    kid: &'a str,
    url: &'a str,
}

#[derive(Error, Debug)]
pub enum JoseError {
    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid private key pem: {0}")]
    Pem(#[from] pem::PemError),
    #[error("invalid key pair: {0}")]
    KeyRejected(#[from] ring::error::KeyRejected),
    #[error("unsupported key type: {0}")]
    UnsupportedKey(String),
    #[error("unsupported elliptic curve with {0} bits")]
    UnsupportedCurve(usize),
    #[error("malformed key")]
    MalformedKey,
    #[error("malformed DER ECDSA signature")]
    MalformedSignature,
    #[error("external account HMAC key is not base64url")]
    MalformedHmacKey,
    #[error("crypto error")]
    Crypto,
}

impl From<ring::error::Unspecified> for JoseError {
    fn from(_: ring::error::Unspecified) -> Self {
        JoseError::Crypto
    }
}
