//! Rate window entity for SeaORM.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "rate_limits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub token: String,
    pub count: i64,
    pub expires_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Conversion from SeaORM Model to the domain window.
impl From<Model> for quorum_core::domain::RateWindow {
    fn from(model: Model) -> Self {
        Self {
            token: model.token,
            count: u64::try_from(model.count).unwrap_or(0),
            expires_at: model.expires_at.into(),
        }
    }
}
