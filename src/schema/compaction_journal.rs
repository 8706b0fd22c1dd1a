//! `compaction_journal(id PK, source_keys, target_key, status, created_at)`
//! — crash-safe record of an in-flight segment merge (§4.3).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "compaction_journal")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// JSON-encoded list of segment keys being merged.
    pub source_keys: String,
    pub target_key: String,
    /// `"pending" | "written" | "committed"`.
    pub status: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
