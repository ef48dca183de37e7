use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub document_id: i64,
    pub person_id: i64,
    pub doc_type: String,
    #[sea_orm(column_type = "Blob")]
    pub access_control_profiles: Vec<u8>,
    #[sea_orm(column_type = "Blob")]
    pub name_spaces: Vec<u8>,
    pub data_timestamp: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::person::Entity",
        from = "Column::PersonId",
        to = "super::person::Column::PersonId"
    )]
    Person,
    #[sea_orm(has_many = "super::issued_document::Entity")]
    IssuedDocument,
}

impl Related<super::person::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Person.def()
    }
}

impl Related<super::issued_document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IssuedDocument.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
