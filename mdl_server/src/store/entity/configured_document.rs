use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "configured_documents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub configured_document_id: i64,
    pub issued_document_id: i64,
    #[sea_orm(column_type = "Blob")]
    pub credential_key_x509_cert_chain: Vec<u8>,
    #[sea_orm(column_type = "Blob", unique)]
    pub encoded_cose_credential_key: Vec<u8>,
    #[sea_orm(column_type = "Blob")]
    pub proof_of_provisioning: Vec<u8>,
    pub last_updated_timestamp: f64,
    pub data_timestamp: f64,
    pub status: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::issued_document::Entity",
        from = "Column::IssuedDocumentId",
        to = "super::issued_document::Column::IssuedDocumentId"
    )]
    IssuedDocument,
    #[sea_orm(has_many = "super::endorsed_authentication_key::Entity")]
    EndorsedAuthenticationKey,
}

impl Related<super::issued_document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IssuedDocument.def()
    }
}

impl Related<super::endorsed_authentication_key::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EndorsedAuthenticationKey.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
