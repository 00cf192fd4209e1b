use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use sea_orm::ConnectionTrait;

use crate::services::listens::ledger::ListenLedger;
use crate::services::listens::played_at::normalize_played_at;

/// Resolves the watermark: the instant of the most recent recorded listen.
///
/// Never cached; every sync run asks again.
pub struct CursorResolver<'c, C: ConnectionTrait> {
    ledger: ListenLedger<'c, C>,
}

impl<'c, C: ConnectionTrait> CursorResolver<'c, C> {
    pub fn new(conn: &'c C) -> Self {
        Self {
            ledger: ListenLedger::new(conn),
        }
    }

    /// `None` when nothing has been recorded yet. Naive stored values are read as UTC.
    pub async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.ledger.max_played_at().await? else {
            return Ok(None);
        };

        let latest = normalize_played_at(&raw)
            .wrap_err("Latest stored listen has an unreadable played_at")?;
        Ok(Some(latest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities;
    use crate::services::listens::track_repository::TrackRepository;
    use crate::services::listens::track_repository::tests::make_track;
    use crate::test_utils::test_db;
    use chrono::TimeZone;
    use sea_orm::{ActiveModelBehavior, EntityTrait, Set};

    async fn insert_raw_listen(db: &crate::database::Database, played_at: &str) {
        let listen = entities::listen::ActiveModel {
            track_id: Set("t1".into()),
            played_at: Set(played_at.into()),
            ..entities::listen::ActiveModel::new()
        };
        entities::listen::Entity::insert(listen)
            .exec(&db.conn)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_listens_no_watermark() {
        let db = test_db().await;
        let cursor = CursorResolver::new(&db.conn);

        assert_eq!(cursor.latest_timestamp().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_watermark_is_latest_listen() {
        let db = test_db().await;
        let track = TrackRepository::new(&db.conn)
            .create(&make_track("t1", "Track 1"))
            .await
            .unwrap();
        let ledger = ListenLedger::new(&db.conn);
        for minute in [0, 10, 5] {
            ledger
                .append(
                    &track,
                    Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap(),
                )
                .await
                .unwrap();
        }

        let cursor = CursorResolver::new(&db.conn);
        assert_eq!(
            cursor.latest_timestamp().await.unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 10, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_naive_stored_value_is_utc() {
        let db = test_db().await;
        TrackRepository::new(&db.conn)
            .create(&make_track("t1", "Track 1"))
            .await
            .unwrap();
        insert_raw_listen(&db, "2024-03-01 10:05:00.000000").await;

        let cursor = CursorResolver::new(&db.conn);
        assert_eq!(
            cursor.latest_timestamp().await.unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_unreadable_stored_value_is_an_error() {
        let db = test_db().await;
        TrackRepository::new(&db.conn)
            .create(&make_track("t1", "Track 1"))
            .await
            .unwrap();
        insert_raw_listen(&db, "not a time").await;

        let cursor = CursorResolver::new(&db.conn);
        assert!(cursor.latest_timestamp().await.is_err());
    }
}
