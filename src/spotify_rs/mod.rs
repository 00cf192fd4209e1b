//! Thin typed wrapper over the parts of the Spotify Web API this crate talks to.

pub mod auth;
pub mod client;
pub mod types;
