use crate::certificate::CertificateRequest;
use rcgen::{CertificateParams, DnType, DistinguishedName};

const EMAIL_ADDRESS_OID: [u64; 7] = [1, 2, 840, 113549, 1, 9, 1];

/// DER encoded PKCS#10 request, signed with the request's own key.
///
/// The SAN extension lists the common name followed by every alternative name.
/// The digest follows the key: SHA-256 for RSA and P-256, SHA-384 for P-384.
pub fn csr_der(request: &CertificateRequest) -> Result<Vec<u8>, rcgen::Error> {
    let csr = params(request)?.serialize_request(&key_pair(request)?)?;
    Ok(csr.der().to_vec())
}

pub fn csr_pem(request: &CertificateRequest) -> Result<String, rcgen::Error> {
    params(request)?.serialize_request(&key_pair(request)?)?.pem()
}

fn key_pair(request: &CertificateRequest) -> Result<rcgen::KeyPair, rcgen::Error> {
    let pem = request
        .key_pair()
        .private_key()
        .pkcs8_pem()
        .map_err(|_| rcgen::Error::CouldNotParseKeyPair)?;
    rcgen::KeyPair::from_pem(&pem)
}

fn params(request: &CertificateRequest) -> Result<CertificateParams, rcgen::Error> {
    let dn = request.distinguished_name();
    let mut params = CertificateParams::new(dn.domains())?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, dn.common_name());
    let optional = [
        (DnType::CountryName, dn.country_name()),
        (DnType::StateOrProvinceName, dn.state_or_province_name()),
        (DnType::LocalityName, dn.locality_name()),
        (DnType::OrganizationName, dn.organization_name()),
        (DnType::OrganizationalUnitName, dn.organizational_unit_name()),
        (DnType::CustomDnType(EMAIL_ADDRESS_OID.to_vec()), dn.email_address()),
    ];
    for (typ, value) in optional {
        if let Some(value) = value {
            name.push(typ, value);
        }
    }
    params.distinguished_name = name;
    Ok(params)
}
