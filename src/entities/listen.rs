use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue::Set};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "listens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Spotify id of the played track (`tracks.spotify_id`)
    pub track_id: String,
    /// RFC 3339 instant. Rows written by this crate are UTC with a `Z` suffix,
    /// older rows may be naive.
    pub played_at: String,
    pub created_at: i64,
}

impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        Self {
            created_at: Set(chrono::Utc::now().timestamp()),
            ..ActiveModelTrait::default()
        }
    }
}
