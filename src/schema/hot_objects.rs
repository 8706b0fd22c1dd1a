//! `hot_objects(sha PK, type, data, size, accessed_at, created_at)` — hot
//! tier entries, tracked separately from `objects` so `last_accessed` can be
//! bumped on every read without touching the durable row (§4.2).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "hot_objects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub sha: String,
    pub r#type: String,
    pub data: Vec<u8>,
    pub size: i64,
    pub accessed_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
