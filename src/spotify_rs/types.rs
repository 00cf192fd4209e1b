use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Spotify OAuth token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    /// Only present on the initial exchange, or when Spotify rotates the token.
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: String,
}

/// Spotify user profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyUser {
    pub id: String,
    pub display_name: Option<String>,
}

/// One page of `/me/player/recently-played`. Items are kept as raw JSON so that one
/// malformed entry does not poison the rest of the page.
#[derive(Debug, Clone, Deserialize)]
pub struct RecentlyPlayedPage {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

/// Play history object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyPlayHistory {
    pub track: SpotifyTrack,
    pub played_at: String,
}

/// Spotify track from API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTrack {
    /// `null` for local files
    pub id: Option<String>,
    pub name: String,
    pub artists: Vec<SpotifySimpleArtist>,
    pub album: SpotifyAlbum,
    pub duration_ms: i64,
    #[serde(default)]
    pub popularity: i32,
    #[serde(default)]
    pub explicit: bool,
    pub preview_url: Option<String>,
    #[serde(default)]
    pub external_urls: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifySimpleArtist {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyAlbum {
    pub id: Option<String>,
    pub name: String,
}

/// Full artist object, fetched for its genres
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotifyAudioFeatures {
    pub tempo: Option<f64>,
    pub energy: Option<f64>,
    pub danceability: Option<f64>,
    pub valence: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub key: Option<i32>,
    pub mode: Option<i32>,
    pub time_signature: Option<i32>,
}
