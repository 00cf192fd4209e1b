use std::collections::BTreeMap;

use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue::Set};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct StringVec(pub Vec<String>);

/// External links keyed by provider, e.g. `"spotify"`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct ExternalUrls(pub BTreeMap<String, String>);

/// A track as it looked the first time it was played. Rows are never refreshed.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tracks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub spotify_id: String,
    pub name: String,
    /// Primary (first listed) artist
    pub artist: String,
    pub artist_id: String,
    pub genres: StringVec,
    pub album: String,
    pub album_id: String,
    pub duration_ms: i32,
    pub popularity: i32,

    pub tempo: Option<f64>,
    pub energy: Option<f64>,
    pub danceability: Option<f64>,
    pub valence: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub key: Option<i32>,
    pub mode: Option<i32>,
    pub time_signature: Option<i32>,

    pub is_explicit: bool,
    pub preview_url: Option<String>,
    pub external_urls: ExternalUrls,
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
