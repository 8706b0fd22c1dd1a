//! `sha_cache(sha PK, type, size, added_at)` — lightweight existence cache,
//! populated alongside `object_index` on every write, that `hasObject`
//! consults ahead of the heavier authoritative index lookup.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sha_cache")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub sha: String,
    pub r#type: String,
    pub size: i64,
    pub added_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
