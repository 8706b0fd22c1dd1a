//! `object_index(sha PK, tier, pack_id?, offset?, size, type, updated_at,
//! chunked?, chunk_count?)` — tier routing table, maintained in lockstep
//! with object writes (§3, §6).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "object_index")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub sha: String,
    /// `"hot" | "warm" | "cold"`.
    pub tier: String,
    pub pack_id: Option<String>,
    pub offset: Option<i64>,
    pub size: i64,
    pub r#type: String,
    pub updated_at: DateTimeUtc,
    pub chunked: bool,
    pub chunk_count: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
