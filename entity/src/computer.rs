use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "computers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String, // hostname, one row per machine
    pub ip: String,
    pub cpu: String,
    pub gpu: String,
    pub motherboard: String,
    pub network_adapters: String, // comma-joined, split on read
    pub last_seen: DateTime,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
