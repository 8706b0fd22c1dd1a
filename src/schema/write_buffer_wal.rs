//! `write_buffer_wal(id PK, sha, type, data, path?, created_at)` — durable
//! backing for the columnar exporter's in-memory write buffer (§4.3).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "write_buffer_wal")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub sha: String,
    pub r#type: String,
    pub data: Vec<u8>,
    pub path: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
