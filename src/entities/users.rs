use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    pub surname: String,

    /// Stored verbatim; lookups lowercase both sides, so the column is
    /// case-insensitively unique in practice.
    #[sea_orm(unique)]
    pub email: String,

    /// SHA-256 legacy-scheme hash, hex encoded.
    pub password_hash: String,

    /// 1 = admin, 2 = moderator. Other values exist for public-site roles
    /// and never authenticate into the back office.
    pub role: i32,

    pub active: bool,

    /// Single live password-reset token, if one has been issued.
    pub reset_token: Option<String>,

    pub reset_token_expiry: Option<DateTimeUtc>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
