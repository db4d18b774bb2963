use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("computers"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("name")).string().not_null().primary_key())
                    .col(ColumnDef::new(Alias::new("ip")).string().not_null())
                    .col(ColumnDef::new(Alias::new("cpu")).string().not_null())
                    .col(ColumnDef::new(Alias::new("gpu")).string().not_null())
                    .col(ColumnDef::new(Alias::new("motherboard")).string().not_null())
                    .col(ColumnDef::new(Alias::new("network_adapters")).string().not_null())
                    .col(ColumnDef::new(Alias::new("last_seen")).date_time().not_null())
                    .col(ColumnDef::new(Alias::new("created_at")).date_time().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("computers")).to_owned())
            .await
    }
}
