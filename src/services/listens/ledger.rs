use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelBehavior, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities;
use crate::services::listens::played_at::format_played_at;
use crate::services::listens::track_repository::TrackRef;

/// Append-only access to the `listens` table.
pub struct ListenLedger<'c, C: ConnectionTrait> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> ListenLedger<'c, C> {
    pub fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    /// The latest stored played-at value, exactly as stored.
    ///
    /// Rows are ordered by the instant they denote rather than by their text, so naive
    /// and offset-carrying values compare correctly.
    pub async fn max_played_at(&self) -> Result<Option<String>> {
        let latest = entities::listen::Entity::find()
            .order_by_desc(Expr::cust("julianday(played_at)"))
            .one(self.conn)
            .await
            .wrap_err("Failed to query latest listen")?;

        Ok(latest.map(|listen| listen.played_at))
    }

    /// Record a play. Returns `false` without writing if this exact play is already
    /// in the ledger.
    pub async fn append(&self, track: &TrackRef, played_at: DateTime<Utc>) -> Result<bool> {
        let played_at = format_played_at(&played_at);

        if entities::listen::Entity::find()
            .filter(entities::listen::Column::TrackId.eq(&track.spotify_id))
            .filter(entities::listen::Column::PlayedAt.eq(&played_at))
            .one(self.conn)
            .await
            .wrap_err("Failed to check for existing listen")?
            .is_some()
        {
            return Ok(false);
        }

        let model = entities::listen::ActiveModel {
            track_id: Set(track.spotify_id.clone()),
            played_at: Set(played_at),
            ..entities::listen::ActiveModel::new()
        };
        entities::listen::Entity::insert(model)
            .exec(self.conn)
            .await
            .wrap_err_with(|| format!("Failed to save listen of {}", track.spotify_id))?;

        Ok(true)
    }

    pub async fn count(&self) -> Result<u64> {
        entities::listen::Entity::find()
            .count(self.conn)
            .await
            .wrap_err("Failed to count listens")
    }
}
