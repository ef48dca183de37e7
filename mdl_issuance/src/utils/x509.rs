//! X.509 certificate issuance and validation for the credential lifecycle:
//! CredentialKey self-certificates, AuthKey certificates carrying a
//! ProofOfBinding extension, and the issuing authority's signing certificate.

use p256::{
    ecdsa::{signature::Verifier, Signature, SigningKey, VerifyingKey},
    pkcs8::EncodePrivateKey,
};
use rcgen::{CertificateParams, CustomExtension, DistinguishedName, DnType, KeyPair, SerialNumber};
use rustls_pki_types::PrivatePkcs8KeyDer;
use serde_bytes::ByteBuf;
use time::{Duration, OffsetDateTime};
use x509_parser::prelude::{FromDer, X509Certificate};

use super::{
    crypto::random_bytes,
    serialization::{cbor_deserialize, cbor_serialize},
};

pub const CREDENTIAL_KEY_COMMON_NAME: &str = "Android Identity Credential Key";
pub const AUTH_KEY_COMMON_NAME: &str = "Android Identity Credential Authentication Key";
pub const ISSUER_COMMON_NAME: &str = "State Of Utopia Issuing Authority Signing Key";
pub const ISSUER_CA_COMMON_NAME: &str = "State Of Utopia";

/// OID of the non-critical extension binding an AuthKey certificate to a
/// ProofOfProvisioning: its value is `cbor(["ProofOfBinding", sha256(pop)])`.
pub const PROOF_OF_BINDING_OID: &str = "1.3.6.1.4.1.11129.2.1.26";

#[derive(thiserror::Error, Debug)]
pub enum CertificateError {
    #[error("certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),
    #[error("private key conversion failed: {0}")]
    KeyConversion(#[from] p256::pkcs8::Error),
    #[error("certificate parsing failed: {0}")]
    Parsing(#[from] x509_parser::nom::Err<x509_parser::error::X509Error>),
    #[error("unsupported public key in certificate")]
    UnsupportedPublicKey,
    #[error("certificate signature did not verify")]
    Signature,
    #[error("unexpected certificate subject")]
    UnexpectedSubject,
    #[error("ProofOfBinding extension missing")]
    ProofOfBindingMissing,
    #[error("malformed ProofOfBinding extension")]
    ProofOfBindingMalformed,
    #[error("ProofOfBinding does not match the proof of provisioning")]
    ProofOfBindingMismatch,
}

fn rcgen_keypair(key: &SigningKey) -> Result<KeyPair, CertificateError> {
    let pkcs8 = key.to_pkcs8_der()?;
    let keypair = KeyPair::from_pkcs8_der_and_sign_algo(
        &PrivatePkcs8KeyDer::from(pkcs8.as_bytes()),
        &rcgen::PKCS_ECDSA_P256_SHA256,
    )?;
    Ok(keypair)
}

fn common_name(name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, name);
    dn
}

fn validity(days: i64) -> (OffsetDateTime, OffsetDateTime) {
    let now = OffsetDateTime::now_utc();
    (now, now + Duration::days(days))
}

/// Self-signed certificate for a freshly generated CredentialKey, with a
/// random serial and one year of validity. A production wallet would instead
/// present a keystore attestation chain here.
pub fn generate_credential_key_certificate(credential_key: &SigningKey) -> Result<Vec<u8>, CertificateError> {
    let mut params = CertificateParams::default();
    params.distinguished_name = common_name(CREDENTIAL_KEY_COMMON_NAME);
    params.serial_number = Some(SerialNumber::from_slice(&random_bytes(8)));
    (params.not_before, params.not_after) = validity(365);

    let cert = params.self_signed(&rcgen_keypair(credential_key)?)?;
    Ok(cert.der().to_vec())
}

/// AuthKey certificate: issued under the CredentialKey, serial 1, one year of
/// validity, carrying the ProofOfBinding extension for the given
/// `sha256(proof_of_provisioning)`.
pub fn generate_auth_key_certificate(
    auth_key: &SigningKey,
    credential_key: &SigningKey,
    proof_of_provisioning_sha256: &[u8],
) -> Result<Vec<u8>, CertificateError> {
    let credential_keypair = rcgen_keypair(credential_key)?;
    let mut issuer_params = CertificateParams::default();
    issuer_params.distinguished_name = common_name(CREDENTIAL_KEY_COMMON_NAME);
    let issuer = issuer_params.self_signed(&credential_keypair)?;

    let proof_of_binding = cbor_serialize(&(
        "ProofOfBinding",
        ByteBuf::from(proof_of_provisioning_sha256.to_vec()),
    ))
    .map_err(|_| CertificateError::ProofOfBindingMalformed)?;

    let mut params = CertificateParams::default();
    params.distinguished_name = common_name(AUTH_KEY_COMMON_NAME);
    params.serial_number = Some(SerialNumber::from_slice(&[1]));
    (params.not_before, params.not_after) = validity(365);
    params.custom_extensions.push(CustomExtension::from_oid_content(
        &[1, 3, 6, 1, 4, 1, 11129, 2, 1, 26],
        proof_of_binding,
    ));

    let cert = params.signed_by(&rcgen_keypair(auth_key)?, &issuer, &credential_keypair)?;
    Ok(cert.der().to_vec())
}

/// The issuing authority's signing certificate: subject
/// `CN=State Of Utopia Issuing Authority Signing Key` issued by
/// `CN=State Of Utopia`, serial 42, five years of validity.
pub fn generate_issuer_auth_certificate(issuer_key: &SigningKey) -> Result<Vec<u8>, CertificateError> {
    let issuer_keypair = rcgen_keypair(issuer_key)?;
    let mut ca_params = CertificateParams::default();
    ca_params.distinguished_name = common_name(ISSUER_CA_COMMON_NAME);
    let ca = ca_params.self_signed(&issuer_keypair)?;

    let mut params = CertificateParams::default();
    params.distinguished_name = common_name(ISSUER_COMMON_NAME);
    params.serial_number = Some(SerialNumber::from_slice(&[42]));
    (params.not_before, params.not_after) = validity(365 * 5);

    let cert = params.signed_by(&issuer_keypair, &ca, &issuer_keypair)?;
    Ok(cert.der().to_vec())
}

/// The P-256 public key of the leaf certificate of a DER certificate (chain).
pub fn certificate_public_key(certificate_der: &[u8]) -> Result<VerifyingKey, CertificateError> {
    let (_, certificate) = X509Certificate::from_der(certificate_der)?;
    let key = VerifyingKey::from_sec1_bytes(&certificate.public_key().subject_public_key.data)
        .map_err(|_| CertificateError::UnsupportedPublicKey)?;
    Ok(key)
}

/// Validate an AuthKey certificate: it must be signed by the CredentialKey,
/// carry the expected subject, and its ProofOfBinding extension must match
/// `sha256(proof_of_provisioning)`. Returns the certified AuthKey.
pub fn validate_auth_key_certificate(
    certificate_der: &[u8],
    credential_key: &VerifyingKey,
    proof_of_provisioning_sha256: &[u8],
) -> Result<VerifyingKey, CertificateError> {
    let (_, certificate) = X509Certificate::from_der(certificate_der)?;

    // First, verify this was signed by the CredentialKey.
    let signature =
        Signature::from_der(&certificate.signature_value.data).map_err(|_| CertificateError::Signature)?;
    credential_key
        .verify(certificate.tbs_certificate.as_ref(), &signature)
        .map_err(|_| CertificateError::Signature)?;

    // Second, inspect the values in the certificate.
    let subject_cn = certificate
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .ok_or(CertificateError::UnexpectedSubject)?;
    if subject_cn != AUTH_KEY_COMMON_NAME {
        return Err(CertificateError::UnexpectedSubject);
    }

    let extension = certificate
        .extensions()
        .iter()
        .find(|extension| extension.oid.to_id_string() == PROOF_OF_BINDING_OID)
        .ok_or(CertificateError::ProofOfBindingMissing)?;
    let (label, digest): (String, ByteBuf) =
        cbor_deserialize(extension.value).map_err(|_| CertificateError::ProofOfBindingMalformed)?;
    if label != "ProofOfBinding" {
        return Err(CertificateError::ProofOfBindingMalformed);
    }
    if digest.as_slice() != proof_of_provisioning_sha256 {
        return Err(CertificateError::ProofOfBindingMismatch);
    }

    certificate_public_key(certificate_der)
}

/// Validate a CredentialKey certificate chain against the provisioning
/// challenge.
// TODO: parse the Android keystore attestation extension, check the challenge
// against it, and walk the chain up to the well-known attestation roots.
pub fn validate_credential_key_certificate_chain(
    _certificate_chain_der: &[u8],
    _challenge: &[u8],
) -> Result<(), CertificateError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rand::rngs::OsRng;

    use crate::utils::crypto::sha256;

    use super::*;

    #[test]
    fn credential_key_certificate() {
        let key = SigningKey::random(&mut OsRng);
        let cert = generate_credential_key_certificate(&key).unwrap();

        assert_eq!(certificate_public_key(&cert).unwrap(), *key.verifying_key());

        let (_, parsed) = X509Certificate::from_der(&cert).unwrap();
        let subject_cn = parsed.subject().iter_common_name().next().unwrap().as_str().unwrap();
        assert_eq!(subject_cn, CREDENTIAL_KEY_COMMON_NAME);
    }

    #[test]
    fn auth_key_certificate_validates() {
        let credential_key = SigningKey::random(&mut OsRng);
        let auth_key = SigningKey::random(&mut OsRng);
        let pop_sha256 = sha256(b"proof of provisioning");

        let cert = generate_auth_key_certificate(&auth_key, &credential_key, &pop_sha256).unwrap();

        let certified = validate_auth_key_certificate(&cert, credential_key.verifying_key(), &pop_sha256).unwrap();
        assert_eq!(certified, *auth_key.verifying_key());
    }

    #[test]
    fn auth_key_certificate_rejects_wrong_binding() {
        let credential_key = SigningKey::random(&mut OsRng);
        let auth_key = SigningKey::random(&mut OsRng);

        let cert =
            generate_auth_key_certificate(&auth_key, &credential_key, &sha256(b"proof of provisioning")).unwrap();

        assert_matches!(
            validate_auth_key_certificate(&cert, credential_key.verifying_key(), &sha256(b"some other proof")),
            Err(CertificateError::ProofOfBindingMismatch)
        );
    }

    #[test]
    fn auth_key_certificate_rejects_wrong_signer() {
        let credential_key = SigningKey::random(&mut OsRng);
        let auth_key = SigningKey::random(&mut OsRng);
        let pop_sha256 = sha256(b"proof of provisioning");

        let cert = generate_auth_key_certificate(&auth_key, &credential_key, &pop_sha256).unwrap();

        let other_key = SigningKey::random(&mut OsRng);
        assert_matches!(
            validate_auth_key_certificate(&cert, other_key.verifying_key(), &pop_sha256),
            Err(CertificateError::Signature)
        );
    }

    #[test]
    fn auth_key_certificate_rejects_wrong_subject() {
        let credential_key = SigningKey::random(&mut OsRng);
        let pop_sha256 = sha256(b"proof of provisioning");

        // A CredentialKey self-certificate has the wrong subject for an AuthKey
        let cert = generate_credential_key_certificate(&credential_key).unwrap();

        assert_matches!(
            validate_auth_key_certificate(&cert, credential_key.verifying_key(), &pop_sha256),
            Err(CertificateError::UnexpectedSubject)
        );
    }

    #[test]
    fn issuer_auth_certificate() {
        let issuer_key = SigningKey::random(&mut OsRng);
        let cert = generate_issuer_auth_certificate(&issuer_key).unwrap();

        assert_eq!(certificate_public_key(&cert).unwrap(), *issuer_key.verifying_key());

        let (_, parsed) = X509Certificate::from_der(&cert).unwrap();
        let subject_cn = parsed.subject().iter_common_name().next().unwrap().as_str().unwrap();
        assert_eq!(subject_cn, ISSUER_COMMON_NAME);
        let issuer_cn = parsed.issuer().iter_common_name().next().unwrap().as_str().unwrap();
        assert_eq!(issuer_cn, ISSUER_CA_COMMON_NAME);
        assert_eq!(parsed.tbs_certificate.raw_serial(), &[42]);
    }
}
