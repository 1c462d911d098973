use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(KeyRotationState::Table)
                    .if_not_exists()
                    // 服务名唯一，作为 upsert 冲突目标
                    .col(
                        ColumnDef::new(KeyRotationState::Service)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(KeyRotationState::NextIndex)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(KeyRotationState::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(KeyRotationState::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum KeyRotationState {
    Table,
    Service,
    NextIndex,
    UpdatedAt,
}
