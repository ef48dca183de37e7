//! Builds the [`StaticAuthData`] certifying one AuthKey: the MSO with blinded
//! per-element digests, signed by the issuing authority.

use chrono::{Duration, Utc};
use ciborium::value::Value;
use indexmap::IndexMap;
use p256::ecdsa::{SigningKey, VerifyingKey};
use rand::seq::SliceRandom;
use serde_bytes::ByteBuf;

use crate::{
    iso::mdocs::{
        DeviceKeyInfo, DigestIDs, DocType, IssuerSignedItem, MobileSecurityObject, ProvisionedNameSpaces,
        StaticAuthData, ValidityInfo, ValueDigests,
    },
    utils::{
        cose::{CoseKey, CoseSign1},
        crypto::{random_bytes, sha256},
        serialization::{cbor_serialize, TaggedBytes},
    },
    Result,
};

/// How long an MSO remains valid.
const MSO_VALIDITY_DAYS: i64 = 365;

/// Builds the encoded [`StaticAuthData`] for a single AuthKey.
///
/// Digest IDs are a random permutation of `0..N` over all elements so that an
/// observer cannot correlate a digest with the element's position in the
/// document, and every element gets a fresh 32-byte random blind. The mapping
/// returned to the wallet carries the same items with their values nulled,
/// for selective disclosure at presentation time.
pub fn generate_static_auth_data(
    doc_type: &DocType,
    name_spaces: &ProvisionedNameSpaces,
    auth_key: &VerifyingKey,
    issuer_key: &SigningKey,
    issuer_cert: &[u8],
) -> Result<Vec<u8>> {
    let element_count = name_spaces.values().map(Vec::len).sum::<usize>() as u64;
    let mut digest_ids: Vec<u64> = (0..element_count).collect();
    digest_ids.shuffle(&mut rand::thread_rng());
    let mut digest_ids = digest_ids.into_iter();

    let mut value_digests = ValueDigests(IndexMap::new());
    let mut digest_id_mapping = IndexMap::new();
    for (name_space, entries) in name_spaces {
        let mut digests_for_ns = DigestIDs(IndexMap::new());
        let mut items_for_ns = Vec::with_capacity(entries.len());
        for entry in entries {
            let digest_id = digest_ids.next().expect("digest IDs cover all elements");
            let random = ByteBuf::from(random_bytes(32));

            let item = TaggedBytes(IssuerSignedItem {
                random: random.clone(),
                digest_id,
                element_value: entry.value.clone(),
                element_identifier: entry.name.clone(),
            });
            let digest = sha256(&cbor_serialize(&item)?);
            digests_for_ns.0.insert(digest_id, ByteBuf::from(digest));

            items_for_ns.push(TaggedBytes(IssuerSignedItem {
                random,
                digest_id,
                element_value: Value::Null,
                element_identifier: entry.name.clone(),
            }));
        }
        value_digests.0.insert(name_space.clone(), digests_for_ns);
        digest_id_mapping.insert(name_space.clone(), items_for_ns);
    }

    let now = Utc::now();
    let mso = MobileSecurityObject {
        version: MobileSecurityObject::VERSION.to_string(),
        digest_algorithm: MobileSecurityObject::DIGEST_ALGORITHM.to_string(),
        value_digests,
        device_key_info: DeviceKeyInfo {
            device_key: CoseKey::try_from(auth_key)?,
        },
        doc_type: doc_type.clone(),
        validity_info: ValidityInfo {
            signed: now.into(),
            valid_from: now.into(),
            valid_until: (now + Duration::days(MSO_VALIDITY_DAYS)).into(),
        },
    };

    let mso_bytes = cbor_serialize(&TaggedBytes(mso))?;
    let issuer_auth = CoseSign1::sign(issuer_key, mso_bytes, Some(issuer_cert), false);

    let static_auth_data = StaticAuthData {
        digest_id_mapping,
        issuer_auth,
    };
    Ok(cbor_serialize(&static_auth_data)?)
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use crate::{
        iso::mdocs::{MobileSecurityObjectBytes, ProvisionedEntry},
        utils::{
            serialization::cbor_deserialize,
            x509::{certificate_public_key, generate_issuer_auth_certificate},
        },
    };

    use super::*;

    fn example_name_spaces() -> ProvisionedNameSpaces {
        IndexMap::from([
            (
                "org.iso.18013.5.1".to_string(),
                vec![
                    ProvisionedEntry {
                        name: "family_name".to_string(),
                        value: Value::Text("Mustermann".to_string()),
                        access_control_profiles: vec![0],
                    },
                    ProvisionedEntry {
                        name: "given_name".to_string(),
                        value: Value::Text("Erika".to_string()),
                        access_control_profiles: vec![0],
                    },
                    ProvisionedEntry {
                        name: "birth_date".to_string(),
                        value: Value::Tag(0, Value::Text("1971-09-01".to_string()).into()),
                        access_control_profiles: vec![0],
                    },
                ],
            ),
            (
                "org.aamva.18013.5.1".to_string(),
                vec![ProvisionedEntry {
                    name: "real_id".to_string(),
                    value: Value::Bool(true),
                    access_control_profiles: vec![0],
                }],
            ),
        ])
    }

    #[test]
    fn mso_digests_match_issuer_signed_items() {
        let name_spaces = example_name_spaces();
        let auth_key = SigningKey::random(&mut OsRng);
        let issuer_key = SigningKey::random(&mut OsRng);
        let issuer_cert = generate_issuer_auth_certificate(&issuer_key).unwrap();

        let encoded = generate_static_auth_data(
            &"org.iso.18013.5.1.mDL".to_string(),
            &name_spaces,
            auth_key.verifying_key(),
            &issuer_key,
            &issuer_cert,
        )
        .unwrap();
        let static_auth_data: StaticAuthData = cbor_deserialize(&encoded).unwrap();

        // IssuerAuth verifies under the certificate attached in its header
        let cert = static_auth_data.issuer_auth.unprotected_certificate().unwrap();
        let signer = certificate_public_key(cert).unwrap();
        assert_eq!(signer, *issuer_key.verifying_key());
        let mso_bytes = static_auth_data.issuer_auth.payload().unwrap();
        static_auth_data.issuer_auth.verify(&signer, mso_bytes).unwrap();

        let TaggedBytes(mso): MobileSecurityObjectBytes = cbor_deserialize(mso_bytes).unwrap();
        assert_eq!(mso.version, "1");
        assert_eq!(mso.digest_algorithm, "SHA-256");
        assert_eq!(mso.doc_type, "org.iso.18013.5.1.mDL");
        assert_eq!(
            VerifyingKey::try_from(&mso.device_key_info.device_key).unwrap(),
            *auth_key.verifying_key()
        );

        // Every nulled item in the mapping, re-filled with its element value,
        // must hash to the digest recorded in the MSO under its digest ID.
        let mut seen_digest_ids = Vec::new();
        for (name_space, items) in &static_auth_data.digest_id_mapping {
            let entries = name_spaces.get(name_space).unwrap();
            assert_eq!(items.len(), entries.len());
            for (item, entry) in items.iter().zip(entries) {
                assert_eq!(item.0.element_identifier, entry.name);
                assert_eq!(item.0.element_value, Value::Null);
                seen_digest_ids.push(item.0.digest_id);

                let filled = TaggedBytes(IssuerSignedItem {
                    random: item.0.random.clone(),
                    digest_id: item.0.digest_id,
                    element_value: entry.value.clone(),
                    element_identifier: entry.name.clone(),
                });
                let digest = sha256(&cbor_serialize(&filled).unwrap());
                let recorded = &mso.value_digests.0[name_space].0[&item.0.digest_id];
                assert_eq!(digest.as_slice(), recorded.as_slice());
            }
        }

        // Digest IDs are a permutation of 0..N
        seen_digest_ids.sort();
        assert_eq!(seen_digest_ids, (0..4).collect::<Vec<_>>());
    }
}
