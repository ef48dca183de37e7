use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "issued_documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub issued_document_id: i64,
    pub document_id: i64,
    pub provisioning_code: String,
    pub consumed_at_timestamp: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::DocumentId",
        to = "super::document::Column::DocumentId"
    )]
    Document,
    #[sea_orm(has_many = "super::configured_document::Entity")]
    ConfiguredDocument,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl Related<super::configured_document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ConfiguredDocument.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
