use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).string().not_null().primary_key())
                    .col(string(Users::Name))
                    .col(string(Users::Email))
                    .col(string_null(Users::Phone))
                    .col(string_null(Users::ImageUrl))
                    .col(timestamp_with_time_zone(Users::CreatedAt))
                    .col(timestamp_with_time_zone(Users::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // Create user_transactions table
        manager
            .create_table(
                Table::create()
                    .table(UserTransactions::Table)
                    .if_not_exists()
                    .col(pk_auto(UserTransactions::Id))
                    .col(string(UserTransactions::UserId))
                    .col(decimal_len(UserTransactions::Amount, 12, 2))
                    .col(string_len(UserTransactions::Currency, 3).default("INR").to_owned())
                    .col(string_len(UserTransactions::Type, 20))
                    .col(
                        string_len(UserTransactions::Status, 20)
                            .default("completed")
                            .to_owned(),
                    )
                    .col(string_null(UserTransactions::Category))
                    .col(json(UserTransactions::Tags))
                    .col(string_null(UserTransactions::Merchant))
                    .col(string_null(UserTransactions::Reference))
                    .col(string_null(UserTransactions::Description))
                    .col(date(UserTransactions::TransactionDate))
                    .col(text_null(UserTransactions::ReceiptUrl))
                    .col(string_null(UserTransactions::ReceiptFilename))
                    .col(timestamp_with_time_zone(UserTransactions::CreatedAt))
                    .col(timestamp_with_time_zone(UserTransactions::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_transactions_user")
                            .from(UserTransactions::Table, UserTransactions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Indexes backing the per-user aggregation queries
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_transactions_user_id_transaction_date")
                    .table(UserTransactions::Table)
                    .col(UserTransactions::UserId)
                    .col(UserTransactions::TransactionDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_transactions_user_id_created_at")
                    .table(UserTransactions::Table)
                    .col(UserTransactions::UserId)
                    .col(UserTransactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_transactions_category")
                    .table(UserTransactions::Table)
                    .col(UserTransactions::Category)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Name,
    Email,
    Phone,
    ImageUrl,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum UserTransactions {
    Table,
    Id,
    UserId,
    Amount,
    Currency,
    Type,
    Status,
    Category,
    Tags,
    Merchant,
    Reference,
    Description,
    TransactionDate,
    ReceiptUrl,
    ReceiptFilename,
    CreatedAt,
    UpdatedAt,
}
