//! SQLite-backed implementation of the catalog. All access runs through a
//! single pooled connection, so flow transitions serialize at the store; the
//! mutating operations each commit one transaction.

pub mod entity;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Schema, Set, TransactionTrait,
};
use tracing::info;

use mdl_issuance::{
    store::{
        encoded_cose_credential_key, ConfiguredDocument, Document, IssuedDocument, Person, StoreError,
        SystemOfRecord, UnixTimestamp,
    },
    utils::x509::certificate_public_key,
};
use p256::ecdsa::VerifyingKey;

use entity::{configured_document, document, endorsed_authentication_key, issued_document, person};

/// URL of a non-persistent SQLite database, handy for tests and demos.
pub const IN_MEMORY_DATABASE_URL: &str = "sqlite::memory:";

pub fn database_url_for_path(path: &std::path::Path) -> String {
    format!("sqlite://{}?mode=rwc", path.display())
}

pub struct DatabaseSystemOfRecord {
    connection: DatabaseConnection,
}

impl DatabaseSystemOfRecord {
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let mut options = ConnectOptions::new(url);
        options.max_connections(1);
        let connection = Database::connect(options).await.map_err(backend)?;

        create_schema(&connection).await.map_err(backend)?;
        info!("opened catalog at {url}");

        Ok(DatabaseSystemOfRecord { connection })
    }
}

async fn create_schema(connection: &DatabaseConnection) -> Result<(), DbErr> {
    let builder = connection.get_database_backend();
    let schema = Schema::new(builder);

    let mut statements = [
        schema.create_table_from_entity(person::Entity),
        schema.create_table_from_entity(document::Entity),
        schema.create_table_from_entity(issued_document::Entity),
        schema.create_table_from_entity(configured_document::Entity),
        schema.create_table_from_entity(endorsed_authentication_key::Entity),
    ];
    for statement in &mut statements {
        statement.if_not_exists();
        connection.execute(builder.build(&*statement)).await?;
    }
    Ok(())
}

fn backend(err: DbErr) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl From<person::Model> for Person {
    fn from(model: person::Model) -> Self {
        Person {
            person_id: model.person_id,
            name: model.name,
            portrait: model.portrait,
        }
    }
}

impl From<document::Model> for Document {
    fn from(model: document::Model) -> Self {
        Document {
            document_id: model.document_id,
            person_id: model.person_id,
            doc_type: model.doc_type,
            access_control_profiles: model.access_control_profiles,
            name_spaces: model.name_spaces,
            data_timestamp: model.data_timestamp,
        }
    }
}

impl From<issued_document::Model> for IssuedDocument {
    fn from(model: issued_document::Model) -> Self {
        IssuedDocument {
            issued_document_id: model.issued_document_id,
            document_id: model.document_id,
            provisioning_code: model.provisioning_code,
            consumed_at_timestamp: model.consumed_at_timestamp,
        }
    }
}

impl From<configured_document::Model> for ConfiguredDocument {
    fn from(model: configured_document::Model) -> Self {
        ConfiguredDocument {
            configured_document_id: model.configured_document_id,
            issued_document_id: model.issued_document_id,
            credential_key_x509_cert_chain: model.credential_key_x509_cert_chain,
            encoded_cose_credential_key: model.encoded_cose_credential_key,
            proof_of_provisioning: model.proof_of_provisioning,
            last_updated_timestamp: model.last_updated_timestamp,
            data_timestamp: model.data_timestamp,
            status: model.status,
        }
    }
}

impl SystemOfRecord for DatabaseSystemOfRecord {
    async fn lookup_person(&self, person_id: i64) -> Result<Person, StoreError> {
        person::Entity::find_by_id(person_id)
            .one(&self.connection)
            .await
            .map_err(backend)?
            .map(Person::from)
            .ok_or(StoreError::NotFound("person"))
    }

    async fn list_persons(&self) -> Result<Vec<Person>, StoreError> {
        let persons = person::Entity::find()
            .all(&self.connection)
            .await
            .map_err(backend)?
            .into_iter()
            .map(Person::from)
            .collect();
        Ok(persons)
    }

    async fn lookup_document(&self, document_id: i64) -> Result<Document, StoreError> {
        document::Entity::find_by_id(document_id)
            .one(&self.connection)
            .await
            .map_err(backend)?
            .map(Document::from)
            .ok_or(StoreError::NotFound("document"))
    }

    async fn lookup_documents_by_person(&self, person_id: i64) -> Result<Vec<i64>, StoreError> {
        let ids = document::Entity::find()
            .filter(document::Column::PersonId.eq(person_id))
            .all(&self.connection)
            .await
            .map_err(backend)?
            .into_iter()
            .map(|model| model.document_id)
            .collect();
        Ok(ids)
    }

    async fn lookup_issued_document(&self, issued_document_id: i64) -> Result<IssuedDocument, StoreError> {
        issued_document::Entity::find_by_id(issued_document_id)
            .one(&self.connection)
            .await
            .map_err(backend)?
            .map(IssuedDocument::from)
            .ok_or(StoreError::NotFound("issued document"))
    }

    async fn lookup_issued_document_by_provisioning_code(
        &self,
        provisioning_code: &str,
    ) -> Result<IssuedDocument, StoreError> {
        issued_document::Entity::find()
            .filter(issued_document::Column::ProvisioningCode.eq(provisioning_code))
            .one(&self.connection)
            .await
            .map_err(backend)?
            .map(IssuedDocument::from)
            .ok_or(StoreError::NotFound("issued document"))
    }

    async fn lookup_configured_document_by_credential_key(
        &self,
        credential_key: &VerifyingKey,
    ) -> Result<ConfiguredDocument, StoreError> {
        let encoded_key = encoded_cose_credential_key(credential_key)?;
        configured_document::Entity::find()
            .filter(configured_document::Column::EncodedCoseCredentialKey.eq(encoded_key))
            .one(&self.connection)
            .await
            .map_err(backend)?
            .map(ConfiguredDocument::from)
            .ok_or(StoreError::NotFound("configured document"))
    }

    async fn lookup_configured_documents_by_issued(&self, issued_document_id: i64) -> Result<Vec<i64>, StoreError> {
        let ids = configured_document::Entity::find()
            .filter(configured_document::Column::IssuedDocumentId.eq(issued_document_id))
            .all(&self.connection)
            .await
            .map_err(backend)?
            .into_iter()
            .map(|model| model.configured_document_id)
            .collect();
        Ok(ids)
    }

    async fn insert_configured_document(
        &self,
        issued_document_id: i64,
        credential_key_x509_cert_chain: &[u8],
        proof_of_provisioning: &[u8],
        last_updated_timestamp: UnixTimestamp,
        data_timestamp: UnixTimestamp,
    ) -> Result<i64, StoreError> {
        let credential_key =
            certificate_public_key(credential_key_x509_cert_chain).map_err(|e| StoreError::Key(e.to_string()))?;
        let encoded_key = encoded_cose_credential_key(&credential_key)?;

        let txn = self.connection.begin().await.map_err(backend)?;

        let existing = configured_document::Entity::find()
            .filter(configured_document::Column::EncodedCoseCredentialKey.eq(encoded_key.clone()))
            .one(&txn)
            .await
            .map_err(backend)?;
        if existing.is_some() {
            return Err(StoreError::DuplicateCredentialKey);
        }

        let mut issued: issued_document::ActiveModel = issued_document::Entity::find_by_id(issued_document_id)
            .one(&txn)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound("issued document"))?
            .into();
        issued.consumed_at_timestamp = Set(Some(last_updated_timestamp));
        issued.update(&txn).await.map_err(backend)?;

        let inserted = configured_document::ActiveModel {
            issued_document_id: Set(issued_document_id),
            credential_key_x509_cert_chain: Set(credential_key_x509_cert_chain.to_vec()),
            encoded_cose_credential_key: Set(encoded_key),
            proof_of_provisioning: Set(proof_of_provisioning.to_vec()),
            last_updated_timestamp: Set(last_updated_timestamp),
            data_timestamp: Set(data_timestamp),
            status: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(backend)?;

        txn.commit().await.map_err(backend)?;
        Ok(inserted.configured_document_id)
    }

    async fn update_configured_document(
        &self,
        configured_document_id: i64,
        proof_of_provisioning: &[u8],
        last_updated_timestamp: UnixTimestamp,
        data_timestamp: UnixTimestamp,
    ) -> Result<(), StoreError> {
        let txn = self.connection.begin().await.map_err(backend)?;
        let mut configured: configured_document::ActiveModel =
            configured_document::Entity::find_by_id(configured_document_id)
                .one(&txn)
                .await
                .map_err(backend)?
                .ok_or(StoreError::NotFound("configured document"))?
                .into();
        configured.proof_of_provisioning = Set(proof_of_provisioning.to_vec());
        configured.last_updated_timestamp = Set(last_updated_timestamp);
        configured.data_timestamp = Set(data_timestamp);
        configured.update(&txn).await.map_err(backend)?;
        txn.commit().await.map_err(backend)
    }

    async fn update_configured_status(&self, configured_document_id: i64, status: &str) -> Result<(), StoreError> {
        let txn = self.connection.begin().await.map_err(backend)?;
        let mut configured: configured_document::ActiveModel =
            configured_document::Entity::find_by_id(configured_document_id)
                .one(&txn)
                .await
                .map_err(backend)?
                .ok_or(StoreError::NotFound("configured document"))?
                .into();
        configured.status = Set(Some(status.to_string()));
        configured.update(&txn).await.map_err(backend)?;
        txn.commit().await.map_err(backend)
    }

    async fn update_document(
        &self,
        document_id: i64,
        name_spaces: &[u8],
        data_timestamp: UnixTimestamp,
    ) -> Result<(), StoreError> {
        let txn = self.connection.begin().await.map_err(backend)?;
        let mut document: document::ActiveModel = document::Entity::find_by_id(document_id)
            .one(&txn)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound("document"))?
            .into();
        document.name_spaces = Set(name_spaces.to_vec());
        document.data_timestamp = Set(data_timestamp);
        document.update(&txn).await.map_err(backend)?;
        txn.commit().await.map_err(backend)
    }

    async fn delete_configured_document(&self, configured_document_id: i64) -> Result<(), StoreError> {
        let result = configured_document::Entity::delete_by_id(configured_document_id)
            .exec(&self.connection)
            .await
            .map_err(backend)?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound("configured document"));
        }
        Ok(())
    }

    async fn insert_person(&self, record: Person) -> Result<(), StoreError> {
        person::ActiveModel {
            person_id: Set(record.person_id),
            name: Set(record.name),
            portrait: Set(record.portrait),
        }
        .insert(&self.connection)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn insert_document(&self, record: Document) -> Result<(), StoreError> {
        document::ActiveModel {
            document_id: Set(record.document_id),
            person_id: Set(record.person_id),
            doc_type: Set(record.doc_type),
            access_control_profiles: Set(record.access_control_profiles),
            name_spaces: Set(record.name_spaces),
            data_timestamp: Set(record.data_timestamp),
        }
        .insert(&self.connection)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn insert_issued_document(&self, record: IssuedDocument) -> Result<(), StoreError> {
        issued_document::ActiveModel {
            issued_document_id: Set(record.issued_document_id),
            document_id: Set(record.document_id),
            provisioning_code: Set(record.provisioning_code),
            consumed_at_timestamp: Set(record.consumed_at_timestamp),
        }
        .insert(&self.connection)
        .await
        .map_err(backend)?;
        Ok(())
    }
}
