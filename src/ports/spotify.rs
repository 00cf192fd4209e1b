use color_eyre::eyre::Result;

/// Decoupled representation of a track's audio analysis from the API.
///
/// Every field is independently optional: Spotify omits some of them and the whole
/// lookup may fail without affecting the play it belongs to.
#[derive(Debug, Clone, Default, PartialEq)]
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

/// Decoupled representation of a Spotify track from the API, enriched with the
/// primary artist's genres and the track's audio features.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotifyApiTrack {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub artist_id: String,
    pub genres: Vec<String>,
    pub album: String,
    pub album_id: String,
    pub duration_ms: i32,
    pub popularity: i32,
    pub audio_features: SpotifyAudioFeatures,
    pub is_explicit: bool,
    pub preview_url: Option<String>,
    pub external_urls: Vec<(String, String)>,
}

/// One entry of the user's recently played history.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotifyApiPlay {
    pub track: SpotifyApiTrack,
    /// Timestamp exactly as reported by the API. May or may not carry an offset.
    pub played_at: String,
}

/// Why a single recently played entry could not be turned into a [`SpotifyApiPlay`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CandidateError {
    #[error("Malformed recently played item: {reason}")]
    MalformedPayload { reason: String },
    #[error("Track '{track}' has no artists")]
    MissingArtist { track: String },
    #[error("Failed to look up artist {artist_id} for track '{track}': {reason}")]
    ArtistLookup {
        track: String,
        artist_id: String,
        reason: String,
    },
}

/// A recently played entry, or the reason it had to be dropped.
pub type PlayCandidate = std::result::Result<SpotifyApiPlay, CandidateError>;

/// Port trait wrapping the Spotify API capabilities used by business logic.
///
/// Implementations live in `services::spotify::client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SpotifyClient: Send + Sync {
    /// Fetch at most `limit` recently played entries. The outer error means the page
    /// itself could not be fetched; per-entry failures are reported inline.
    async fn recently_played(&self, limit: u32) -> Result<Vec<PlayCandidate>>;
}
