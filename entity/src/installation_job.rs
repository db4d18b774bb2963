use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "installation_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub computer_name: String,
    pub hardware_id: String,
    pub driver_id: Option<i32>, // driver row id at report time, none once the driver is gone
    pub status: String,         // JobStatus string form
    pub created_at: DateTime,
    pub completed_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
