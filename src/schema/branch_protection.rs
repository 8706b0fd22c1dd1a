//! `branch_protection(id PK, pattern UNIQUE, required_reviews,
//! prevent_force_push, prevent_deletion, enabled, ...)` — per-pattern
//! branch-protection rules (§4.5).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "branch_protection")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub pattern: String,
    pub required_reviews: i32,
    pub prevent_force_push: bool,
    pub prevent_deletion: bool,
    pub enabled: bool,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
