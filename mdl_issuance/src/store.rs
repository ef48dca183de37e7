//! The catalog backing the issuing server: persons, the authoritative
//! documents describing their credentials, issued documents (one-shot
//! provisioning capabilities) and configured documents (wallet instances that
//! bound a CredentialKey to an issued document).

use chrono::{DateTime, Utc};
use p256::ecdsa::VerifyingKey;

use crate::utils::{cose::CoseKey, serialization::cbor_serialize};

/// UNIX epoch seconds. `data_timestamp` doubles as the logical version of a
/// document's content.
pub type UnixTimestamp = f64;

pub fn epoch_seconds(time: DateTime<Utc>) -> UnixTimestamp {
    time.timestamp_micros() as f64 / 1_000_000.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub person_id: i64,
    pub name: String,
    pub portrait: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub document_id: i64,
    pub person_id: i64,
    pub doc_type: String,
    /// CBOR-encoded [`AccessControlProfiles`](crate::iso::AccessControlProfiles).
    pub access_control_profiles: Vec<u8>,
    /// CBOR-encoded [`ProvisionedNameSpaces`](crate::iso::ProvisionedNameSpaces).
    pub name_spaces: Vec<u8>,
    pub data_timestamp: UnixTimestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssuedDocument {
    pub issued_document_id: i64,
    pub document_id: i64,
    pub provisioning_code: String,
    /// Set when the code is used up by a successful provisioning; a consumed
    /// code can no longer start a provisioning flow.
    pub consumed_at_timestamp: Option<UnixTimestamp>,
}

/// Status signalling to the next update flow that this wallet instance must
/// delete its copy. One-way marker.
pub const CONFIGURED_DOCUMENT_STATUS_TO_DELETE: &str = "TO_DELETE";

#[derive(Debug, Clone, PartialEq)]
pub struct ConfiguredDocument {
    pub configured_document_id: i64,
    pub issued_document_id: i64,
    pub credential_key_x509_cert_chain: Vec<u8>,
    /// The CBOR-encoded COSE_Key of the CredentialKey; unique across all
    /// configured documents and the key by which later flows find this row.
    pub encoded_cose_credential_key: Vec<u8>,
    pub proof_of_provisioning: Vec<u8>,
    pub last_updated_timestamp: UnixTimestamp,
    pub data_timestamp: UnixTimestamp,
    pub status: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("no {0} found for the given key")]
    NotFound(&'static str),
    #[error("credential key is already configured")]
    DuplicateCredentialKey,
    #[error("credential key not usable as an index: {0}")]
    Key(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Derives the index under which a configured document is stored: the CBOR
/// encoding of the CredentialKey's COSE_Key form.
pub fn encoded_cose_credential_key(credential_key: &VerifyingKey) -> Result<Vec<u8>, StoreError> {
    let cose_key = CoseKey::try_from(credential_key).map_err(|e| StoreError::Key(e.to_string()))?;
    cbor_serialize(&cose_key).map_err(|e| StoreError::Key(e.to_string()))
}

/// The transactional store behind the flows. Every mutating operation commits
/// before it returns; a flow transition therefore either fully lands in the
/// catalog or leaves it untouched.
#[trait_variant::make(SystemOfRecord: Send)]
pub trait LocalSystemOfRecord {
    async fn lookup_person(&self, person_id: i64) -> Result<Person, StoreError>;
    async fn list_persons(&self) -> Result<Vec<Person>, StoreError>;

    async fn lookup_document(&self, document_id: i64) -> Result<Document, StoreError>;
    async fn lookup_documents_by_person(&self, person_id: i64) -> Result<Vec<i64>, StoreError>;

    async fn lookup_issued_document(&self, issued_document_id: i64) -> Result<IssuedDocument, StoreError>;
    async fn lookup_issued_document_by_provisioning_code(
        &self,
        provisioning_code: &str,
    ) -> Result<IssuedDocument, StoreError>;

    async fn lookup_configured_document_by_credential_key(
        &self,
        credential_key: &VerifyingKey,
    ) -> Result<ConfiguredDocument, StoreError>;
    async fn lookup_configured_documents_by_issued(&self, issued_document_id: i64) -> Result<Vec<i64>, StoreError>;

    /// Registers a wallet instance for an issued document. The index key is
    /// recomputed from the certificate chain's public key, and the issued
    /// document's provisioning code is consumed in the same transaction.
    async fn insert_configured_document(
        &self,
        issued_document_id: i64,
        credential_key_x509_cert_chain: &[u8],
        proof_of_provisioning: &[u8],
        last_updated_timestamp: UnixTimestamp,
        data_timestamp: UnixTimestamp,
    ) -> Result<i64, StoreError>;

    async fn update_configured_document(
        &self,
        configured_document_id: i64,
        proof_of_provisioning: &[u8],
        last_updated_timestamp: UnixTimestamp,
        data_timestamp: UnixTimestamp,
    ) -> Result<(), StoreError>;

    async fn update_configured_status(&self, configured_document_id: i64, status: &str) -> Result<(), StoreError>;

    async fn update_document(
        &self,
        document_id: i64,
        name_spaces: &[u8],
        data_timestamp: UnixTimestamp,
    ) -> Result<(), StoreError>;

    async fn delete_configured_document(&self, configured_document_id: i64) -> Result<(), StoreError>;

    // The external plane through which seed data and the admin surface create
    // catalog records.
    async fn insert_person(&self, person: Person) -> Result<(), StoreError>;
    async fn insert_document(&self, document: Document) -> Result<(), StoreError>;
    async fn insert_issued_document(&self, issued_document: IssuedDocument) -> Result<(), StoreError>;
}

pub use memory::MemorySystemOfRecord;

mod memory {
    use std::collections::BTreeMap;

    use p256::ecdsa::VerifyingKey;
    use parking_lot::Mutex;

    use crate::utils::x509::certificate_public_key;

    use super::{
        encoded_cose_credential_key, ConfiguredDocument, Document, IssuedDocument, Person, StoreError, SystemOfRecord,
        UnixTimestamp,
    };

    #[derive(Default)]
    struct Tables {
        persons: BTreeMap<i64, Person>,
        documents: BTreeMap<i64, Document>,
        issued_documents: BTreeMap<i64, IssuedDocument>,
        configured_documents: BTreeMap<i64, ConfiguredDocument>,
        next_configured_document_id: i64,
    }

    /// Non-persistent catalog. All operations run under one lock, which gives
    /// the same serialization the SQLite backend gets from its single
    /// connection.
    #[derive(Default)]
    pub struct MemorySystemOfRecord {
        tables: Mutex<Tables>,
    }

    impl MemorySystemOfRecord {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl SystemOfRecord for MemorySystemOfRecord {
        async fn lookup_person(&self, person_id: i64) -> Result<Person, StoreError> {
            self.tables
                .lock()
                .persons
                .get(&person_id)
                .cloned()
                .ok_or(StoreError::NotFound("person"))
        }

        async fn list_persons(&self) -> Result<Vec<Person>, StoreError> {
            Ok(self.tables.lock().persons.values().cloned().collect())
        }

        async fn lookup_document(&self, document_id: i64) -> Result<Document, StoreError> {
            self.tables
                .lock()
                .documents
                .get(&document_id)
                .cloned()
                .ok_or(StoreError::NotFound("document"))
        }

        async fn lookup_documents_by_person(&self, person_id: i64) -> Result<Vec<i64>, StoreError> {
            Ok(self
                .tables
                .lock()
                .documents
                .values()
                .filter(|document| document.person_id == person_id)
                .map(|document| document.document_id)
                .collect())
        }

        async fn lookup_issued_document(&self, issued_document_id: i64) -> Result<IssuedDocument, StoreError> {
            self.tables
                .lock()
                .issued_documents
                .get(&issued_document_id)
                .cloned()
                .ok_or(StoreError::NotFound("issued document"))
        }

        async fn lookup_issued_document_by_provisioning_code(
            &self,
            provisioning_code: &str,
        ) -> Result<IssuedDocument, StoreError> {
            self.tables
                .lock()
                .issued_documents
                .values()
                .find(|issued| issued.provisioning_code == provisioning_code)
                .cloned()
                .ok_or(StoreError::NotFound("issued document"))
        }

        async fn lookup_configured_document_by_credential_key(
            &self,
            credential_key: &VerifyingKey,
        ) -> Result<ConfiguredDocument, StoreError> {
            let encoded_key = encoded_cose_credential_key(credential_key)?;
            self.tables
                .lock()
                .configured_documents
                .values()
                .find(|configured| configured.encoded_cose_credential_key == encoded_key)
                .cloned()
                .ok_or(StoreError::NotFound("configured document"))
        }

        async fn lookup_configured_documents_by_issued(
            &self,
            issued_document_id: i64,
        ) -> Result<Vec<i64>, StoreError> {
            Ok(self
                .tables
                .lock()
                .configured_documents
                .values()
                .filter(|configured| configured.issued_document_id == issued_document_id)
                .map(|configured| configured.configured_document_id)
                .collect())
        }

        async fn insert_configured_document(
            &self,
            issued_document_id: i64,
            credential_key_x509_cert_chain: &[u8],
            proof_of_provisioning: &[u8],
            last_updated_timestamp: UnixTimestamp,
            data_timestamp: UnixTimestamp,
        ) -> Result<i64, StoreError> {
            let credential_key = certificate_public_key(credential_key_x509_cert_chain)
                .map_err(|e| StoreError::Key(e.to_string()))?;
            let encoded_key = encoded_cose_credential_key(&credential_key)?;

            let mut tables = self.tables.lock();
            if tables
                .configured_documents
                .values()
                .any(|configured| configured.encoded_cose_credential_key == encoded_key)
            {
                return Err(StoreError::DuplicateCredentialKey);
            }

            let issued = tables
                .issued_documents
                .get_mut(&issued_document_id)
                .ok_or(StoreError::NotFound("issued document"))?;
            issued.consumed_at_timestamp = Some(last_updated_timestamp);

            tables.next_configured_document_id += 1;
            let configured_document_id = tables.next_configured_document_id;
            tables.configured_documents.insert(
                configured_document_id,
                ConfiguredDocument {
                    configured_document_id,
                    issued_document_id,
                    credential_key_x509_cert_chain: credential_key_x509_cert_chain.to_vec(),
                    encoded_cose_credential_key: encoded_key,
                    proof_of_provisioning: proof_of_provisioning.to_vec(),
                    last_updated_timestamp,
                    data_timestamp,
                    status: None,
                },
            );
            Ok(configured_document_id)
        }

        async fn update_configured_document(
            &self,
            configured_document_id: i64,
            proof_of_provisioning: &[u8],
            last_updated_timestamp: UnixTimestamp,
            data_timestamp: UnixTimestamp,
        ) -> Result<(), StoreError> {
            let mut tables = self.tables.lock();
            let configured = tables
                .configured_documents
                .get_mut(&configured_document_id)
                .ok_or(StoreError::NotFound("configured document"))?;
            configured.proof_of_provisioning = proof_of_provisioning.to_vec();
            configured.last_updated_timestamp = last_updated_timestamp;
            configured.data_timestamp = data_timestamp;
            Ok(())
        }

        async fn update_configured_status(
            &self,
            configured_document_id: i64,
            status: &str,
        ) -> Result<(), StoreError> {
            let mut tables = self.tables.lock();
            let configured = tables
                .configured_documents
                .get_mut(&configured_document_id)
                .ok_or(StoreError::NotFound("configured document"))?;
            configured.status = Some(status.to_string());
            Ok(())
        }

        async fn update_document(
            &self,
            document_id: i64,
            name_spaces: &[u8],
            data_timestamp: UnixTimestamp,
        ) -> Result<(), StoreError> {
            let mut tables = self.tables.lock();
            let document = tables
                .documents
                .get_mut(&document_id)
                .ok_or(StoreError::NotFound("document"))?;
            document.name_spaces = name_spaces.to_vec();
            document.data_timestamp = data_timestamp;
            Ok(())
        }

        async fn delete_configured_document(&self, configured_document_id: i64) -> Result<(), StoreError> {
            self.tables
                .lock()
                .configured_documents
                .remove(&configured_document_id)
                .map(|_| ())
                .ok_or(StoreError::NotFound("configured document"))
        }

        async fn insert_person(&self, person: Person) -> Result<(), StoreError> {
            self.tables.lock().persons.insert(person.person_id, person);
            Ok(())
        }

        async fn insert_document(&self, document: Document) -> Result<(), StoreError> {
            let mut tables = self.tables.lock();
            if !tables.persons.contains_key(&document.person_id) {
                return Err(StoreError::NotFound("person"));
            }
            tables.documents.insert(document.document_id, document);
            Ok(())
        }

        async fn insert_issued_document(&self, issued_document: IssuedDocument) -> Result<(), StoreError> {
            let mut tables = self.tables.lock();
            if !tables.documents.contains_key(&issued_document.document_id) {
                return Err(StoreError::NotFound("document"));
            }
            tables
                .issued_documents
                .insert(issued_document.issued_document_id, issued_document);
            Ok(())
        }
    }
}
