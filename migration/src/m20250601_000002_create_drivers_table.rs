use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("drivers"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alias::new("hardware_id")).string().not_null().unique_key())
                    .col(ColumnDef::new(Alias::new("model")).string().not_null())
                    .col(ColumnDef::new(Alias::new("driver_version")).string().not_null())
                    .col(ColumnDef::new(Alias::new("file_path")).string().not_null())
                    .col(ColumnDef::new(Alias::new("file_size")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("original_filename")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("os_version"))
                            .string()
                            .not_null()
                            .default("Windows 10"),
                    )
                    .col(ColumnDef::new(Alias::new("supported_hardware")).string().null())
                    .col(ColumnDef::new(Alias::new("upload_date")).date_time().not_null())
                    .col(ColumnDef::new(Alias::new("created_at")).date_time().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("drivers")).to_owned())
            .await
    }
}
