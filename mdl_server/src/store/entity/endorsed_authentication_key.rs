//! Reserved for per-use short-lived key certifications; no flow writes this
//! table yet.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "endorsed_authentication_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub endorsed_authentication_key_id: i64,
    pub configured_document_id: i64,
    #[sea_orm(column_type = "Blob", nullable)]
    pub authentication_key_x509_cert: Option<Vec<u8>>,
    #[sea_orm(column_type = "Blob", nullable)]
    pub static_auth_datas: Option<Vec<u8>>,
    pub generated_at_timestamp: f64,
    pub expires_at_timestamp: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::configured_document::Entity",
        from = "Column::ConfiguredDocumentId",
        to = "super::configured_document::Column::ConfiguredDocumentId"
    )]
    ConfiguredDocument,
}

impl Related<super::configured_document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ConfiguredDocument.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
