pub mod listen;
pub mod spotify_account;
pub mod track;
