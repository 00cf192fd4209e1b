use std::collections::HashMap;
use std::num::NonZeroU32;

use color_eyre::eyre::{Report, Result, WrapErr};
use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed,
};

use crate::ports::spotify::{
    CandidateError, PlayCandidate, SpotifyApiPlay, SpotifyApiTrack, SpotifyAudioFeatures,
    SpotifyClient,
};
use crate::spotify_rs::client::{RecentlyPlayedApi, SpotifyWebApi};
use crate::spotify_rs::types::{self, SpotifyPlayHistory, SpotifySimpleArtist, SpotifyTrack};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

// Artist and audio-feature lookups happen once per played track, keep them polite
const ENRICHMENT_REQUESTS_PER_SECOND: NonZeroU32 = NonZeroU32::new(10).unwrap();

/// [`SpotifyClient`] backed by the Spotify Web API.
pub struct SpotifyApiClient<A: RecentlyPlayedApi = SpotifyWebApi> {
    api: A,
    limiter: DirectRateLimiter,
}

impl SpotifyApiClient {
    pub fn new(access_token: String) -> Self {
        Self::with_api(SpotifyWebApi::new(access_token))
    }
}

impl<A: RecentlyPlayedApi> SpotifyApiClient<A> {
    pub fn with_api(api: A) -> Self {
        Self {
            api,
            limiter: RateLimiter::direct(Quota::per_second(ENRICHMENT_REQUESTS_PER_SECOND)),
        }
    }

    async fn artist_genres(&self, artist_id: &str) -> Result<Vec<String>> {
        self.limiter.until_ready().await;
        let artist = self.api.get_artist(artist_id).await?;
        Ok(artist.genres)
    }

    /// Audio features are nice to have. A failed lookup leaves every feature empty.
    async fn audio_features(&self, track_id: &str, track_name: &str) -> SpotifyAudioFeatures {
        self.limiter.until_ready().await;
        match self.api.get_audio_features(track_id).await {
            Ok(features) => features.into(),
            Err(error) => {
                tracing::warn!(
                    "Could not get audio features for {}: {}",
                    track_name,
                    error_chain(&error)
                );
                SpotifyAudioFeatures::default()
            }
        }
    }

    async fn enrich(
        &self,
        item: serde_json::Value,
        genres_by_artist: &mut HashMap<String, Result<Vec<String>, String>>,
    ) -> PlayCandidate {
        let history = parse_play_history(item)?;
        // Local files have no id and can't be stored, don't spend lookups on them
        let track_id = track_id(&history.track)?;
        let artist = primary_artist(&history.track)?.clone();
        let artist_id = artist.id.clone().unwrap_or_default();

        let genres = match genres_by_artist.get(&artist_id) {
            Some(cached) => cached.clone(),
            None => {
                let fetched = self
                    .artist_genres(&artist_id)
                    .await
                    .map_err(|error| error_chain(&error));
                genres_by_artist.insert(artist_id.clone(), fetched.clone());
                fetched
            }
        }
        .map_err(|reason| CandidateError::ArtistLookup {
            track: history.track.name.clone(),
            artist_id: artist_id.clone(),
            reason,
        })?;

        let features = self.audio_features(&track_id, &history.track.name).await;
        let track = to_api_track(history.track, track_id, artist, genres, features)?;
        tracing::debug!("Processed recently played track: {}", track.name);

        Ok(SpotifyApiPlay {
            track,
            played_at: history.played_at,
        })
    }
}

#[async_trait::async_trait]
impl<A: RecentlyPlayedApi> SpotifyClient for SpotifyApiClient<A> {
    async fn recently_played(&self, limit: u32) -> Result<Vec<PlayCandidate>> {
        tracing::info!("Fetching {} recently played tracks", limit);
        let page = self
            .api
            .get_recently_played(limit)
            .await
            .wrap_err("Failed to fetch recently played page")?;

        // Plays of the same artist share one lookup, successful or not
        let mut genres_by_artist = HashMap::new();
        let mut candidates = Vec::with_capacity(page.items.len());
        for item in page.items {
            candidates.push(self.enrich(item, &mut genres_by_artist).await);
        }

        Ok(candidates)
    }
}

fn error_chain(error: &Report) -> String {
    error
        .chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}

fn parse_play_history(item: serde_json::Value) -> Result<SpotifyPlayHistory, CandidateError> {
    serde_json::from_value(item).map_err(|error| CandidateError::MalformedPayload {
        reason: error.to_string(),
    })
}

fn primary_artist(track: &SpotifyTrack) -> Result<&SpotifySimpleArtist, CandidateError> {
    track
        .artists
        .first()
        .filter(|artist| artist.id.as_deref().is_some_and(|id| !id.is_empty()))
        .ok_or_else(|| CandidateError::MissingArtist {
            track: track.name.clone(),
        })
}

fn track_id(track: &SpotifyTrack) -> Result<String, CandidateError> {
    track
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CandidateError::MalformedPayload {
            reason: format!("Track '{}' has no Spotify id", track.name),
        })
}

fn to_api_track(
    track: SpotifyTrack,
    id: String,
    artist: SpotifySimpleArtist,
    genres: Vec<String>,
    audio_features: SpotifyAudioFeatures,
) -> Result<SpotifyApiTrack, CandidateError> {
    let duration_ms =
        i32::try_from(track.duration_ms).map_err(|_| CandidateError::MalformedPayload {
            reason: format!("Track {} has duration {}", id, track.duration_ms),
        })?;

    Ok(SpotifyApiTrack {
        id,
        name: track.name,
        artist: artist.name,
        artist_id: artist.id.unwrap_or_default(),
        genres,
        album: track.album.name,
        album_id: track.album.id.unwrap_or_default(),
        duration_ms,
        popularity: track.popularity,
        audio_features,
        is_explicit: track.explicit,
        preview_url: track.preview_url,
        external_urls: track.external_urls.into_iter().collect(),
    })
}

impl From<types::SpotifyAudioFeatures> for SpotifyAudioFeatures {
    fn from(features: types::SpotifyAudioFeatures) -> Self {
        Self {
            tempo: features.tempo,
            energy: features.energy,
            danceability: features.danceability,
            valence: features.valence,
            acousticness: features.acousticness,
            instrumentalness: features.instrumentalness,
            key: features.key,
            mode: features.mode,
            time_signature: features.time_signature,
        }
    }
}
