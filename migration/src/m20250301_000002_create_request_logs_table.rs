use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RequestLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RequestLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RequestLogs::Service).string_len(64).not_null())
                    .col(ColumnDef::new(RequestLogs::Model).string_len(255).not_null())
                    .col(ColumnDef::new(RequestLogs::StatusCode).integer().not_null())
                    .col(ColumnDef::new(RequestLogs::LatencyMs).big_integer().not_null())
                    .col(
                        ColumnDef::new(RequestLogs::CacheStatus)
                            .string_len(8)
                            .not_null()
                            .default("N/A"),
                    )
                    .col(ColumnDef::new(RequestLogs::ErrorMessage).text())
                    .col(
                        ColumnDef::new(RequestLogs::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_request_logs_service_time")
                    .table(RequestLogs::Table)
                    .col(RequestLogs::Service)
                    .col(RequestLogs::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RequestLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RequestLogs {
    Table,
    Id,
    Service,
    Model,
    StatusCode,
    LatencyMs,
    CacheStatus,
    ErrorMessage,
    CreatedAt,
}
