//! Demo records for the issuing server: two persons, each with an mDL
//! document and an issued document waiting on a provisioning code.

use chrono::Utc;
use ciborium::value::Value;
use indexmap::IndexMap;
use rand::Rng;

use anyhow::Result;
use mdl_issuance::{
    iso::mdocs::{AccessControlProfile, ProvisionedEntry, ProvisionedNameSpaces},
    store::{epoch_seconds, Document, IssuedDocument, Person, SystemOfRecord},
    utils::serialization::{cbor_deserialize, cbor_serialize},
};

pub const MDL_DOC_TYPE: &str = "org.iso.18013.5.1.mDL";
pub const MDL_NAMESPACE: &str = "org.iso.18013.5.1";
pub const AAMVA_NAMESPACE: &str = "org.aamva.18013.5.1";

// Stand-ins for the portrait JPEGs of the original records.
const ERIKA_PORTRAIT: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x45, 0x72, 0x69, 0x6b, 0x61, 0xff, 0xd9];
const JOHN_PORTRAIT: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x4a, 0x6f, 0x68, 0x6e, 0xff, 0xd9];

fn mdl_access_control_profiles() -> Vec<AccessControlProfile> {
    vec![AccessControlProfile {
        id: 0,
        user_authentication_required: true,
        timeout_millis: 1000,
    }]
}

fn entry(name: &str, value: Value) -> ProvisionedEntry {
    ProvisionedEntry {
        name: name.to_string(),
        value,
        access_control_profiles: vec![0],
    }
}

fn mdl_name_spaces(family_name: &str, given_name: &str, portrait: &[u8], birth_date: Option<&str>) -> ProvisionedNameSpaces {
    let mut mdl_entries = vec![
        entry("family_name", Value::Text(family_name.to_string())),
        entry("given_name", Value::Text(given_name.to_string())),
        entry("portrait", Value::Bytes(portrait.to_vec())),
    ];
    if let Some(birth_date) = birth_date {
        mdl_entries.push(entry(
            "birth_date",
            Value::Tag(0, Value::Text(birth_date.to_string()).into()),
        ));
    }

    IndexMap::from([
        (MDL_NAMESPACE.to_string(), mdl_entries),
        (
            AAMVA_NAMESPACE.to_string(),
            vec![entry("real_id", Value::Bool(true))],
        ),
    ])
}

pub async fn seed<S: SystemOfRecord + Sync>(store: &S) -> Result<()> {
    let profiles = cbor_serialize(&mdl_access_control_profiles())?;

    // Erika Mustermann
    store
        .insert_person(Person {
            person_id: 10,
            name: "Erika Mustermann".to_string(),
            portrait: ERIKA_PORTRAIT.to_vec(),
        })
        .await?;
    let name_spaces = mdl_name_spaces("Mustermann", "Erika", ERIKA_PORTRAIT, Some("1971-09-01"));
    store
        .insert_document(Document {
            document_id: 11,
            person_id: 10,
            doc_type: MDL_DOC_TYPE.to_string(),
            access_control_profiles: profiles.clone(),
            name_spaces: cbor_serialize(&name_spaces)?,
            data_timestamp: epoch_seconds(Utc::now()),
        })
        .await?;
    store
        .insert_issued_document(IssuedDocument {
            issued_document_id: 12,
            document_id: 11,
            provisioning_code: "1001".to_string(),
            consumed_at_timestamp: None,
        })
        .await?;

    // John Doe
    store
        .insert_person(Person {
            person_id: 20,
            name: "John Doe".to_string(),
            portrait: JOHN_PORTRAIT.to_vec(),
        })
        .await?;
    let name_spaces = mdl_name_spaces("Doe", "John", JOHN_PORTRAIT, None);
    store
        .insert_document(Document {
            document_id: 21,
            person_id: 20,
            doc_type: MDL_DOC_TYPE.to_string(),
            access_control_profiles: profiles,
            name_spaces: cbor_serialize(&name_spaces)?,
            data_timestamp: epoch_seconds(Utc::now()),
        })
        .await?;
    store
        .insert_issued_document(IssuedDocument {
            issued_document_id: 22,
            document_id: 21,
            provisioning_code: "2001".to_string(),
            consumed_at_timestamp: None,
        })
        .await?;

    Ok(())
}

/// Simulates fresh content from the system of record: appends a random suffix
/// to the family name and bumps the document's `data_timestamp`, so that the
/// next update flow reports `"update"`.
pub async fn refresh_document<S: SystemOfRecord + Sync>(store: &S, document_id: i64) -> Result<()> {
    let document = store.lookup_document(document_id).await?;
    let mut name_spaces: ProvisionedNameSpaces = cbor_deserialize(&document.name_spaces)?;

    let suffix: String = {
        let mut rng = rand::thread_rng();
        (0..3).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect()
    };
    if let Some(entries) = name_spaces.get_mut(MDL_NAMESPACE) {
        if let Some(family_name) = entries.iter_mut().find(|entry| entry.name == "family_name") {
            let current = family_name.value.as_text().unwrap_or_default();
            family_name.value = Value::Text(format!("{current} {suffix}"));
        }
    }

    store
        .update_document(document_id, &cbor_serialize(&name_spaces)?, epoch_seconds(Utc::now()))
        .await?;
    Ok(())
}
