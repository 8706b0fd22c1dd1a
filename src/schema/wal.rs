//! `wal(id PK, operation, payload, created_at, flushed)` — write-ahead log
//! for the object store's exactly-once crash recovery (§4.2).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "wal")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub operation: String,
    /// Human-readable summary of the op's payload, not the payload itself.
    pub payload: String,
    pub created_at: DateTimeUtc,
    pub flushed: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
