use sea_orm::entity::prelude::*;

/// A profile row for a user of the system.
///
/// The identifier is issued by the external identity provider (or generated
/// locally as a UUID when none is supplied) and never changes after creation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Format-validated on every write.
    pub email: String,
    pub phone: Option<String>,
    /// Profile image reference (URL).
    pub image_url: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    // A user owns multiple transactions.
    #[sea_orm(has_many = "super::user_transaction::Entity")]
    UserTransaction,
}

impl Related<super::user_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserTransaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
