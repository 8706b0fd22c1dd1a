//! `bloom_filter(id=1 PK, filter_data, item_count, updated_at)` — persisted
//! approximate-membership filter, rebuilt from the segment index on cold
//! start (§3).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "bloom_filter")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub filter_data: Vec<u8>,
    pub item_count: i64,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
