use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Direction of a money movement. Amounts are stored positive; the sign is
/// encoded here only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    #[sea_orm(string_value = "debit")]
    Debit,
    #[sea_orm(string_value = "credit")]
    Credit,
}

/// Settlement state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// A single financial transaction owned by a user.
///
/// `transaction_date` is the calendar date the movement happened, distinct
/// from the row's `created_at` timestamp; it drives every aggregation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "user_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: String,
    /// Always positive; direction is carried by `transaction_type`.
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub amount: Decimal,
    /// 3-letter currency code.
    pub currency: String,
    #[sea_orm(column_name = "type")]
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub category: Option<String>,
    /// JSON array of strings.
    pub tags: Json,
    pub merchant: Option<String>,
    /// External transaction id, or a generated placeholder.
    pub reference: Option<String>,
    pub description: Option<String>,
    pub transaction_date: NaiveDate,
    /// Receipt attachment as a data URI; never set for bulk-ingested rows.
    #[sea_orm(column_type = "Text", nullable)]
    pub receipt_url: Option<String>,
    pub receipt_filename: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
