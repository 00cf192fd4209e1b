//! Incremental sync of recently played tracks into the local listen ledger.

pub mod cursor;
pub mod ledger;
pub mod played_at;
pub mod sync;
pub mod track_repository;
