use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "drivers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub hardware_id: String, // derived from model+version unless supplied
    pub model: String,
    pub driver_version: String,
    pub file_path: String, // where the package landed in the drivers dir
    pub file_size: i64,
    pub original_filename: String,
    pub os_version: String,
    pub supported_hardware: Option<String>,
    pub upload_date: DateTime,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
