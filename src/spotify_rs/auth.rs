use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use url::Url;

use crate::spotify_rs::types::SpotifyTokenResponse;

const SPOTIFY_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Everything needed to read the user's play history.
pub const SPOTIFY_SCOPES: [&str; 2] = ["user-read-recently-played", "user-read-private"];

/// Generate a random string from the URL-safe unreserved character set
fn generate_random_string(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            const CHARSET: &[u8] =
                b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
            CHARSET[rng.random_range(0..CHARSET.len())] as char
        })
        .collect()
}

/// Generate a random state parameter for CSRF protection
fn generate_state() -> String {
    generate_random_string(16)
}

/// A pending authorization: send the user to `url`, then check `state` on the way back.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Build the authorization-code flow URL
/// https://developer.spotify.com/documentation/web-api/tutorials/code-flow
pub fn authorization_request(client_id: &str, redirect_uri: &str) -> AuthorizationRequest {
    let state = generate_state();
    let scope = SPOTIFY_SCOPES.join(" ");

    let url = format!(
        "{}?client_id={}&response_type=code&redirect_uri={}&state={}&scope={}",
        SPOTIFY_AUTH_URL,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&state),
        urlencoding::encode(&scope)
    );

    AuthorizationRequest { url, state }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CallbackError {
    #[error("Not a valid callback URL: {0}")]
    InvalidUrl(String),
    #[error("Spotify denied the authorization: {0}")]
    Denied(String),
    #[error("Callback state does not match the authorization request")]
    StateMismatch,
    #[error("Callback URL has no authorization code")]
    MissingCode,
}

/// Extract the authorization code from the URL Spotify redirected the user to.
pub fn parse_callback(callback_url: &str, expected_state: &str) -> Result<String, CallbackError> {
    let url = Url::parse(callback_url.trim())
        .map_err(|e| CallbackError::InvalidUrl(e.to_string()))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(CallbackError::Denied(value.into_owned())),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(CallbackError::StateMismatch);
    }

    code.filter(|code| !code.is_empty())
        .ok_or(CallbackError::MissingCode)
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Spotify rejected the token request: {reason}")]
    Rejected { reason: String },
    #[error("Failed to send http request: {0}")]
    FailedToSendRequest(reqwest::Error),
    #[error("Failed to parse response: {0}")]
    FailedToParseResponse(reqwest::Error),
}

async fn request_token(
    client_id: &str,
    client_secret: &str,
    params: &[(&str, &str)],
) -> Result<SpotifyTokenResponse, TokenError> {
    let client = reqwest::Client::new();

    let response = client
        .post(SPOTIFY_TOKEN_URL)
        // Serializes to x-www-form-urlencoded and sets the header, as Spotify requires
        .form(params)
        .header(
            "Authorization",
            format!(
                "Basic {}",
                STANDARD.encode(format!("{}:{}", client_id, client_secret))
            ),
        )
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .map_err(TokenError::FailedToSendRequest)?;

    if !response.status().is_success() {
        return Err(TokenError::Rejected {
            reason: response
                .text()
                .await
                .unwrap_or("Failed to get error text".to_string()),
        });
    }

    response
        .json()
        .await
        .map_err(TokenError::FailedToParseResponse)
}

/// Exchange an authorization code for access and refresh tokens
pub async fn exchange_code_for_token(
    client_id: &str,
    client_secret: &str,
    code: &str,
    // Must be the exact redirect URI used to build the authorization URL
    redirect_uri: &str,
) -> Result<SpotifyTokenResponse, TokenError> {
    request_token(
        client_id,
        client_secret,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ],
    )
    .await
}

/// Refresh an access token using a refresh token
pub async fn refresh_access_token(
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<SpotifyTokenResponse, TokenError> {
    request_token(
        client_id,
        client_secret,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ],
    )
    .await
}
