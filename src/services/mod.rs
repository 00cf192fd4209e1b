pub mod listens;
pub mod spotify;
