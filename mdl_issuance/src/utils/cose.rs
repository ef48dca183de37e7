//! COSE_Key and COSE_Sign1 containers (RFC 8152), specialized to EC P-256
//! keys and ES256 signatures as required by ISO 18013-5.

use ciborium::value::Value;
use coset::{
    iana, AsCborValue, CoseKeyBuilder, CoseSign1Builder, HeaderBuilder, Label, RegisteredLabelWithPrivate,
    SignatureContext,
};
use p256::{
    ecdsa::{
        signature::{Signer, Verifier},
        Signature, SigningKey, VerifyingKey,
    },
    EncodedPoint,
};
use serde::{Deserialize, Serialize};

/// Unprotected header label under which an `x5chain` certificate is attached
/// to a COSE_Sign1.
pub const COSE_X5CHAIN_HEADER_LABEL: i64 = 33;

#[derive(thiserror::Error, Debug)]
pub enum CoseError {
    #[error("wrong key type")]
    KeyWrongType,
    #[error("missing coordinate")]
    KeyMissingCoordinate,
    #[error("unexpected COSE_Key label")]
    KeyUnexpectedCoseLabel,
    #[error("coordinate parse failed")]
    KeyCoordinateParseFailed,
    #[error("key parse failed: {0}")]
    KeyParseFailed(#[from] p256::ecdsa::Error),
    #[error("unsupported signature algorithm")]
    UnsupportedAlgorithm,
    #[error("malformed signature")]
    SignatureFormat,
    #[error("signature verification failed")]
    SignatureVerification,
    #[error("no payload in COSE_Sign1")]
    MissingPayload,
    #[error("COSE structure error: {0}")]
    Structure(coset::CoseError),
}

/// A COSE_Key holding an EC P-256 public key.
#[derive(Debug, Clone, PartialEq)]
pub struct CoseKey(pub coset::CoseKey);

impl TryFrom<&VerifyingKey> for CoseKey {
    type Error = CoseError;

    fn try_from(key: &VerifyingKey) -> Result<Self, Self::Error> {
        let encoded_point = key.to_encoded_point(false);
        let x = encoded_point.x().ok_or(CoseError::KeyMissingCoordinate)?.to_vec();
        let y = encoded_point.y().ok_or(CoseError::KeyMissingCoordinate)?.to_vec();

        let key = CoseKey(CoseKeyBuilder::new_ec2_pub_key(iana::EllipticCurve::P_256, x, y).build());
        Ok(key)
    }
}

impl TryFrom<&CoseKey> for VerifyingKey {
    type Error = CoseError;

    fn try_from(key: &CoseKey) -> Result<Self, Self::Error> {
        if key.0.kty != coset::RegisteredLabel::Assigned(iana::KeyType::EC2) {
            return Err(CoseError::KeyWrongType);
        }

        let crv = key.0.params.first().ok_or(CoseError::KeyWrongType)?;
        if *crv != (Label::Int(-1), Value::Integer(1.into())) {
            return Err(CoseError::KeyWrongType);
        }

        let x = key.0.params.get(1).ok_or(CoseError::KeyMissingCoordinate)?;
        if x.0 != Label::Int(-2) {
            return Err(CoseError::KeyUnexpectedCoseLabel);
        }
        let y = key.0.params.get(2).ok_or(CoseError::KeyMissingCoordinate)?;
        if y.0 != Label::Int(-3) {
            return Err(CoseError::KeyUnexpectedCoseLabel);
        }

        let x_bytes = x.1.as_bytes().ok_or(CoseError::KeyCoordinateParseFailed)?;
        let y_bytes = y.1.as_bytes().ok_or(CoseError::KeyCoordinateParseFailed)?;
        if x_bytes.len() != 32 || y_bytes.len() != 32 {
            return Err(CoseError::KeyCoordinateParseFailed);
        }

        let key = VerifyingKey::from_encoded_point(&EncodedPoint::from_affine_coordinates(
            x_bytes.as_slice().into(),
            y_bytes.as_slice().into(),
            false,
        ))
        .map_err(CoseError::KeyParseFailed)?;
        Ok(key)
    }
}

impl Serialize for CoseKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0
            .clone()
            .to_cbor_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CoseKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        coset::CoseKey::from_cbor_value(value)
            .map(CoseKey)
            .map_err(serde::de::Error::custom)
    }
}

/// A COSE_Sign1 whose signature is a 64-byte IEEE P-1363 `r || s` ECDSA/SHA-256
/// signature, as mandated by ISO 18013-5.
#[derive(Debug, Clone, PartialEq)]
pub struct CoseSign1(pub coset::CoseSign1);

impl CoseSign1 {
    /// Sign `payload` with ES256. The payload is embedded, unless `detached`
    /// in which case the third tuple element is an empty byte string. An
    /// optional DER certificate is attached under the `x5chain` unprotected
    /// header.
    pub fn sign(key: &SigningKey, payload: Vec<u8>, certificate: Option<&[u8]>, detached: bool) -> Self {
        let protected = HeaderBuilder::new().algorithm(iana::Algorithm::ES256).build();
        let mut unprotected = HeaderBuilder::new();
        if let Some(cert) = certificate {
            unprotected = unprotected.value(COSE_X5CHAIN_HEADER_LABEL, Value::Bytes(cert.to_vec()));
        }

        let mut sign1 = CoseSign1Builder::new()
            .protected(protected)
            .unprotected(unprotected.build())
            .payload(payload)
            .create_signature(&[], |to_be_signed| {
                let signature: Signature = key.sign(to_be_signed);
                signature.to_bytes().to_vec()
            })
            .build();
        if detached {
            sign1.payload = Some(Vec::new());
        }

        CoseSign1(sign1)
    }

    /// The embedded payload of an attached COSE_Sign1.
    pub fn payload(&self) -> Result<&[u8], CoseError> {
        self.0
            .payload
            .as_deref()
            .filter(|payload| !payload.is_empty())
            .ok_or(CoseError::MissingPayload)
    }

    /// Verify the ES256 signature over `data`, which is the embedded payload
    /// for the attached variant and externally supplied for the detached one.
    /// Fails closed on any shape mismatch.
    pub fn verify(&self, key: &VerifyingKey, data: &[u8]) -> Result<(), CoseError> {
        if self.0.protected.header.alg
            != Some(RegisteredLabelWithPrivate::Assigned(iana::Algorithm::ES256))
        {
            return Err(CoseError::UnsupportedAlgorithm);
        }

        let signature = Signature::from_slice(&self.0.signature).map_err(|_| CoseError::SignatureFormat)?;
        let to_be_signed = coset::sig_structure_data(
            SignatureContext::CoseSign1,
            self.0.protected.clone(),
            None,
            &[],
            data,
        );
        key.verify(&to_be_signed, &signature)
            .map_err(|_| CoseError::SignatureVerification)
    }

    /// The certificate attached under the `x5chain` unprotected header, if any.
    pub fn unprotected_certificate(&self) -> Option<&[u8]> {
        self.0
            .unprotected
            .rest
            .iter()
            .find(|(label, _)| *label == Label::Int(COSE_X5CHAIN_HEADER_LABEL))
            .and_then(|(_, value)| value.as_bytes())
            .map(Vec::as_slice)
    }
}

impl Serialize for CoseSign1 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0
            .clone()
            .to_cbor_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CoseSign1 {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        coset::CoseSign1::from_cbor_value(value)
            .map(CoseSign1)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rand::rngs::OsRng;

    use crate::utils::serialization::{cbor_deserialize, cbor_serialize};

    use super::*;

    #[test]
    fn cose_key_roundtrip() {
        let key = SigningKey::random(&mut OsRng);
        let cose_key = CoseKey::try_from(key.verifying_key()).unwrap();

        let recovered = VerifyingKey::try_from(&cose_key).unwrap();
        assert_eq!(*key.verifying_key(), recovered);

        // And the same through its CBOR encoding
        let encoded = cbor_serialize(&cose_key).unwrap();
        let decoded: CoseKey = cbor_deserialize(&encoded).unwrap();
        assert_eq!(cose_key, decoded);
    }

    #[test]
    fn cose_key_rejects_wrong_curve() {
        let key = SigningKey::random(&mut OsRng);
        let mut cose_key = CoseKey::try_from(key.verifying_key()).unwrap();
        cose_key.0.params[0].1 = Value::Integer(2.into());

        assert_matches!(VerifyingKey::try_from(&cose_key), Err(CoseError::KeyWrongType));
    }

    #[test]
    fn sign_and_verify() {
        let key = SigningKey::random(&mut OsRng);
        let payload = b"some data to be signed".to_vec();

        let sign1 = CoseSign1::sign(&key, payload.clone(), None, false);
        assert_eq!(sign1.payload().unwrap(), payload.as_slice());
        assert_eq!(sign1.0.signature.len(), 64);

        sign1.verify(key.verifying_key(), sign1.payload().unwrap()).unwrap();
    }

    #[test]
    fn verify_rejects_tampering() {
        let key = SigningKey::random(&mut OsRng);
        let payload = b"some data to be signed".to_vec();
        let sign1 = CoseSign1::sign(&key, payload.clone(), None, false);

        // Different data
        assert_matches!(
            sign1.verify(key.verifying_key(), b"other data"),
            Err(CoseError::SignatureVerification)
        );

        // Different key
        let other_key = SigningKey::random(&mut OsRng);
        assert_matches!(
            sign1.verify(other_key.verifying_key(), &payload),
            Err(CoseError::SignatureVerification)
        );

        // Truncated signature
        let mut truncated = sign1.clone();
        truncated.0.signature.pop();
        assert_matches!(
            truncated.verify(key.verifying_key(), &payload),
            Err(CoseError::SignatureFormat)
        );

        // Tampered signature
        let mut tampered = sign1.clone();
        tampered.0.signature[0] ^= 0x01;
        assert_matches!(
            tampered.verify(key.verifying_key(), &payload),
            Err(CoseError::SignatureVerification)
        );
    }

    #[test]
    fn detached_payload() {
        let key = SigningKey::random(&mut OsRng);
        let payload = b"detached data".to_vec();

        let sign1 = CoseSign1::sign(&key, payload.clone(), None, true);
        assert_matches!(sign1.payload(), Err(CoseError::MissingPayload));

        // The signature is still over the payload itself
        sign1.verify(key.verifying_key(), &payload).unwrap();
    }

    #[test]
    fn x5chain_header() {
        let key = SigningKey::random(&mut OsRng);
        let cert = b"not really a certificate".to_vec();

        let sign1 = CoseSign1::sign(&key, b"data".to_vec(), Some(&cert), false);
        assert_eq!(sign1.unprotected_certificate().unwrap(), cert.as_slice());

        let encoded = cbor_serialize(&sign1).unwrap();
        let decoded: CoseSign1 = cbor_deserialize(&encoded).unwrap();
        assert_eq!(decoded.unprotected_certificate().unwrap(), cert.as_slice());
    }
}
