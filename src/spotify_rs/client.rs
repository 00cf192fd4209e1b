use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use serde::de::DeserializeOwned;

use crate::spotify_rs::types::{
    RecentlyPlayedPage, SpotifyArtist, SpotifyAudioFeatures, SpotifyUser,
};

const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";

/// Maximum page size accepted by `/me/player/recently-played`
pub const MAX_RECENTLY_PLAYED_LIMIT: u32 = 50;

/// The play-history endpoints the sync reads from.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecentlyPlayedApi: Send + Sync {
    /// Get the most recent page of the user's play history, newest first.
    async fn get_recently_played(&self, limit: u32) -> Result<RecentlyPlayedPage>;
    async fn get_artist(&self, artist_id: &str) -> Result<SpotifyArtist>;
    async fn get_audio_features(&self, track_id: &str) -> Result<SpotifyAudioFeatures>;
}

/// Spotify Web API client bound to a single access token
pub struct SpotifyWebApi {
    access_token: String,
    client: reqwest::Client,
}

impl SpotifyWebApi {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            client: reqwest::Client::new(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .wrap_err_with(|| format!("Failed to send request to {}", url))?
            .error_for_status()
            .wrap_err_with(|| format!("Spotify rejected request to {}", url))?;

        response
            .json()
            .await
            .wrap_err_with(|| format!("Failed to parse response from {}", url))
    }

    /// Get the current user's profile
    pub async fn get_current_user(&self) -> Result<SpotifyUser> {
        self.get(&format!("{}/me", SPOTIFY_API_URL)).await
    }
}

#[async_trait::async_trait]
impl RecentlyPlayedApi for SpotifyWebApi {
    async fn get_recently_played(&self, limit: u32) -> Result<RecentlyPlayedPage> {
        let limit = limit.clamp(1, MAX_RECENTLY_PLAYED_LIMIT);
        self.get(&format!(
            "{}/me/player/recently-played?limit={}",
            SPOTIFY_API_URL, limit
        ))
        .await
    }

    async fn get_artist(&self, artist_id: &str) -> Result<SpotifyArtist> {
        self.get(&format!(
            "{}/artists/{}",
            SPOTIFY_API_URL,
            urlencoding::encode(artist_id)
        ))
        .await
    }

    async fn get_audio_features(&self, track_id: &str) -> Result<SpotifyAudioFeatures> {
        self.get(&format!(
            "{}/audio-features/{}",
            SPOTIFY_API_URL,
            urlencoding::encode(track_id)
        ))
        .await
    }
}
