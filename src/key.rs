use rcgen::{SignatureAlgorithm, PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384};
use std::fmt;

/// PEM encoded private key. The key material is only decoded for the duration
/// of a single signing operation.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    pem: String,
}

impl PrivateKey {
    pub fn new(pem: impl Into<String>) -> Self {
        Self { pem: pem.into() }
    }
    pub fn pem(&self) -> &str {
        &self.pem
    }
    pub(crate) fn der(&self) -> Result<pem::Pem, pem::PemError> {
        pem::parse(&self.pem)
    }
    /// The key as a PKCS#8 `PRIVATE KEY` block. PKCS#1 RSA keys are wrapped,
    /// everything else is returned as is.
    pub(crate) fn pkcs8_pem(&self) -> Result<String, pem::PemError> {
        let key = self.der()?;
        if key.tag() != "RSA PRIVATE KEY" {
            return Ok(self.pem.clone());
        }
        let mut info = vec![0x02, 0x01, 0x00];
        info.extend_from_slice(&RSA_ENCRYPTION_ALGORITHM);
        info.extend(der_tlv(0x04, key.contents()));
        Ok(pem::encode(&pem::Pem::new("PRIVATE KEY", der_tlv(0x30, &info))))
    }
}

/// AlgorithmIdentifier for rsaEncryption (1.2.840.113549.1.1.1) with NULL parameters.
const RSA_ENCRYPTION_ALGORITHM: [u8; 15] = [
    0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, 0x05, 0x00,
];

fn der_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = value.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes: Vec<u8> = len.to_be_bytes().into_iter().skip_while(|b| *b == 0).collect();
        out.push(0x80 | bytes.len() as u8);
        out.extend(bytes);
    }
    out.extend_from_slice(value);
    out
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pem: String,
}

impl PublicKey {
    pub fn new(pem: impl Into<String>) -> Self {
        Self { pem: pem.into() }
    }
    pub fn pem(&self) -> &str {
        &self.pem
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    EcdsaP256,
    EcdsaP384,
}

impl KeyType {
    fn alg(self) -> &'static SignatureAlgorithm {
        match self {
            KeyType::EcdsaP256 => &PKCS_ECDSA_P256_SHA256,
            KeyType::EcdsaP384 => &PKCS_ECDSA_P384_SHA384,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    public_key: PublicKey,
    private_key: PrivateKey,
}

impl KeyPair {
    pub fn new(public_key: PublicKey, private_key: PrivateKey) -> Self {
        Self {
            public_key,
            private_key,
        }
    }

    pub fn generate(key_type: KeyType) -> Result<Self, rcgen::Error> {
        let key_pair = rcgen::KeyPair::generate_for(key_type.alg())?;
        Ok(Self::new(
            PublicKey::new(key_pair.public_key_pem()),
            PrivateKey::new(key_pair.serialize_pem()),
        ))
    }

    /// Derives the public half from an RSA, P-256 or P-384 private key.
    pub fn from_private_key(private_key: PrivateKey) -> Result<Self, rcgen::Error> {
        let key_pair = rcgen::KeyPair::from_pem(&private_key.pkcs8_pem().map_err(|_| rcgen::Error::CouldNotParseKeyPair)?)?;
        Ok(Self::new(PublicKey::new(key_pair.public_key_pem()), private_key))
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}
