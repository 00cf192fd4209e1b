use color_eyre::eyre::{Result, WrapErr};
use sea_orm::{ActiveModelBehavior, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

use crate::entities;
use crate::ports::spotify::SpotifyApiTrack;

/// Identity of a persisted track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    pub id: i64,
    pub spotify_id: String,
}

impl From<entities::track::Model> for TrackRef {
    fn from(model: entities::track::Model) -> Self {
        Self {
            id: model.id,
            spotify_id: model.spotify_id,
        }
    }
}

/// Create-or-reuse access to the `tracks` table. There is deliberately no update.
pub struct TrackRepository<'c, C: ConnectionTrait> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> TrackRepository<'c, C> {
    pub fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    pub async fn find_by_spotify_id(&self, spotify_id: &str) -> Result<Option<TrackRef>> {
        let track = entities::track::Entity::find()
            .filter(entities::track::Column::SpotifyId.eq(spotify_id))
            .one(self.conn)
            .await
            .wrap_err_with(|| format!("Failed to look up track {}", spotify_id))?;

        Ok(track.map(TrackRef::from))
    }

    /// Persist a track seen for the first time.
    pub async fn create(&self, track: &SpotifyApiTrack) -> Result<TrackRef> {
        let features = &track.audio_features;
        let model = entities::track::ActiveModel {
            spotify_id: Set(track.id.clone()),
            name: Set(track.name.clone()),
            artist: Set(track.artist.clone()),
            artist_id: Set(track.artist_id.clone()),
            genres: Set(entities::track::StringVec(track.genres.clone())),
            album: Set(track.album.clone()),
            album_id: Set(track.album_id.clone()),
            duration_ms: Set(track.duration_ms),
            popularity: Set(track.popularity),
            tempo: Set(features.tempo),
            energy: Set(features.energy),
            danceability: Set(features.danceability),
            valence: Set(features.valence),
            acousticness: Set(features.acousticness),
            instrumentalness: Set(features.instrumentalness),
            key: Set(features.key),
            mode: Set(features.mode),
            time_signature: Set(features.time_signature),
            is_explicit: Set(track.is_explicit),
            preview_url: Set(track.preview_url.clone()),
            external_urls: Set(entities::track::ExternalUrls(
                track.external_urls.iter().cloned().collect(),
            )),
            ..entities::track::ActiveModel::new()
        };

        let saved = entities::track::Entity::insert(model)
            .exec_with_returning(self.conn)
            .await
            .wrap_err_with(|| format!("Failed to save track {}", track.id))?;

        tracing::info!("Saved new track '{}' by {}", saved.name, saved.artist);
        Ok(saved.into())
    }
}
