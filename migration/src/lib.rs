pub use sea_orm_migration::prelude::*;
mod m20250601_000001_create_computers_table;
mod m20250601_000002_create_drivers_table;
mod m20250601_000003_create_installation_jobs_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_computers_table::Migration),
            Box::new(m20250601_000002_create_drivers_table::Migration),
            Box::new(m20250601_000003_create_installation_jobs_table::Migration),
        ]
    }
}
