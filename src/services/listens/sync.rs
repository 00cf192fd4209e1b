use std::sync::Arc;

use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use sea_orm::{ConnectionTrait, TransactionTrait};

use crate::database::Database;
use crate::ports::spotify::{CandidateError, PlayCandidate, SpotifyClient};
use crate::services::listens::cursor::CursorResolver;
use crate::services::listens::ledger::ListenLedger;
use crate::services::listens::played_at::{PlayedAtError, normalize_played_at};
use crate::services::listens::track_repository::TrackRepository;

/// Spotify returns at most this many recently played items per request.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Counts of what a single sync run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub tracks_added: u32,
    pub listens_added: u32,
    pub already_recorded: u32,
    pub skipped: u32,
}

impl SyncReport {
    fn record(&mut self, outcome: &CandidateOutcome) {
        match outcome {
            CandidateOutcome::Recorded { track_created } => {
                self.listens_added += 1;
                if *track_created {
                    self.tracks_added += 1;
                }
            }
            CandidateOutcome::AlreadyRecorded => self.already_recorded += 1,
            CandidateOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SkipReason {
    #[error(transparent)]
    Candidate(#[from] CandidateError),
    #[error(transparent)]
    PlayedAt(#[from] PlayedAtError),
}

/// What happened to one recently played entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    Recorded { track_created: bool },
    /// At or before the watermark, or the exact play is already stored
    AlreadyRecorded,
    Skipped(SkipReason),
}

/// Pulls the recently played page and records the plays that are newer than the
/// latest recorded listen.
///
/// Runs must not overlap: the watermark is only meaningful once the previous run has
/// committed or rolled back.
pub struct ListenSyncService<C: SpotifyClient> {
    db: Arc<Database>,
    client: C,
    page_size: u32,
}

impl<C: SpotifyClient> ListenSyncService<C> {
    pub fn new(db: Arc<Database>, client: C) -> Self {
        Self {
            db,
            client,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
        self
    }

    /// Run one sync. Everything is written in one transaction: on any error nothing
    /// from this run is visible and the next run simply starts over.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<SyncReport> {
        let watermark = CursorResolver::new(&self.db.conn)
            .latest_timestamp()
            .await
            .wrap_err("Failed to resolve the latest recorded listen")?;
        tracing::info!(?watermark, "Resolved listen watermark");

        let candidates = self
            .client
            .recently_played(self.page_size)
            .await
            .wrap_err("Failed to fetch recently played tracks")?;
        tracing::info!("Fetched {} recently played items", candidates.len());

        let txn = self
            .db
            .conn
            .begin()
            .await
            .wrap_err("Failed to begin transaction")?;

        let mut report = SyncReport::default();
        for candidate in candidates {
            let outcome = reconcile(&txn, watermark, candidate).await?;
            if let CandidateOutcome::Skipped(reason) = &outcome {
                tracing::warn!("Skipping recently played item: {}", reason);
            }
            report.record(&outcome);
        }

        txn.commit()
            .await
            .wrap_err("Failed to commit listen sync")?;

        tracing::info!(
            "Added {} new tracks and {} new listens ({} already recorded, {} skipped)",
            report.tracks_added,
            report.listens_added,
            report.already_recorded,
            report.skipped
        );
        Ok(report)
    }
}

/// Decide what to do with one candidate and stage its writes on `txn`.
///
/// Problems with the candidate itself become [`CandidateOutcome::Skipped`]; storage
/// errors are returned and abort the run.
async fn reconcile(
    txn: &impl ConnectionTrait,
    watermark: Option<DateTime<Utc>>,
    candidate: PlayCandidate,
) -> Result<CandidateOutcome> {
    let play = match candidate {
        Ok(play) => play,
        Err(error) => return Ok(CandidateOutcome::Skipped(error.into())),
    };

    let played_at = match normalize_played_at(&play.played_at) {
        Ok(played_at) => played_at,
        Err(error) => return Ok(CandidateOutcome::Skipped(error.into())),
    };

    // Closed boundary: a play at exactly the watermark is the one already stored
    if watermark.is_some_and(|watermark| played_at <= watermark) {
        tracing::debug!(
            "Skipping already recorded listen: {} at {}",
            play.track.name,
            played_at
        );
        return Ok(CandidateOutcome::AlreadyRecorded);
    }

    let tracks = TrackRepository::new(txn);
    let (track, track_created) = match tracks.find_by_spotify_id(&play.track.id).await? {
        Some(existing) => (existing, false),
        None => (tracks.create(&play.track).await?, true),
    };

    if !ListenLedger::new(txn).append(&track, played_at).await? {
        tracing::debug!(
            "Listen of {} at {} is already stored",
            track.spotify_id,
            played_at
        );
        return Ok(CandidateOutcome::AlreadyRecorded);
    }

    Ok(CandidateOutcome::Recorded { track_created })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities;
    use crate::ports::spotify::{MockSpotifyClient, SpotifyApiPlay};
    use crate::services::listens::track_repository::tests::make_track;
    use crate::test_utils::test_db;
    use chrono::TimeZone;
    use color_eyre::eyre::eyre;
    use sea_orm::{ActiveModelBehavior, ColumnTrait, EntityTrait, QueryFilter, Set};

    fn play(track_id: &str, played_at: &str) -> PlayCandidate {
        Ok(SpotifyApiPlay {
            track: make_track(track_id, &format!("Track {}", track_id)),
            played_at: played_at.into(),
        })
    }

    fn make_mock_client(candidates: Vec<PlayCandidate>) -> MockSpotifyClient {
        let mut client = MockSpotifyClient::new();
        client
            .expect_recently_played()
            .returning(move |_| Ok(candidates.clone()));
        client
    }

    async fn sync(db: &Arc<Database>, candidates: Vec<PlayCandidate>) -> Result<SyncReport> {
        ListenSyncService::new(db.clone(), make_mock_client(candidates))
            .run_once()
            .await
    }

    async fn watermark(db: &Database) -> Option<DateTime<Utc>> {
        CursorResolver::new(&db.conn)
            .latest_timestamp()
            .await
            .unwrap()
    }

    async fn listen_count(db: &Database) -> u64 {
        ListenLedger::new(&db.conn).count().await.unwrap()
    }

    async fn track_count(db: &Database) -> usize {
        entities::track::Entity::find()
            .all(&db.conn)
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_first_sync_into_empty_ledger() {
        let db = test_db().await;

        let report = sync(
            &db,
            vec![
                play("t1", "2024-03-01T10:05:00.000Z"),
                play("t1", "2024-03-01T10:00:00.000Z"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.tracks_added, 1);
        assert_eq!(report.listens_added, 2);
        assert_eq!(
            watermark(&db).await,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_only_plays_after_watermark_are_recorded() {
        let db = test_db().await;
        sync(&db, vec![play("t1", "2024-03-01T10:05:00Z")])
            .await
            .unwrap();

        let report = sync(
            &db,
            vec![
                play("t1", "2024-03-01T10:10:00Z"),
                play("t1", "2024-03-01T10:05:00Z"),
                play("t1", "2024-03-01T10:00:00Z"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.tracks_added, 0);
        assert_eq!(report.listens_added, 1);
        assert_eq!(report.already_recorded, 2);
        assert_eq!(listen_count(&db).await, 2);
        assert_eq!(
            watermark(&db).await,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 10, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_second_identical_run_adds_nothing() {
        let db = test_db().await;
        let page = vec![
            play("t1", "2024-03-01T10:10:00.000Z"),
            play("t2", "2024-03-01T10:05:00.000Z"),
        ];

        let first = sync(&db, page.clone()).await.unwrap();
        assert_eq!(first.tracks_added, 2);
        assert_eq!(first.listens_added, 2);

        let second = sync(&db, page).await.unwrap();
        assert_eq!(second.tracks_added, 0);
        assert_eq!(second.listens_added, 0);
        assert_eq!(second.already_recorded, 2);
        assert_eq!(listen_count(&db).await, 2);
        assert_eq!(track_count(&db).await, 2);
    }

    #[tokio::test]
    async fn test_watermark_boundary_is_closed() {
        let db = test_db().await;
        sync(&db, vec![play("t1", "2024-03-01T10:05:00.000Z")])
            .await
            .unwrap();

        let report = sync(
            &db,
            vec![
                play("t2", "2024-03-01T10:05:00.000Z"),
                play("t3", "2024-03-01T10:05:00.001Z"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.listens_added, 1);
        assert_eq!(report.tracks_added, 1);
        let t2_listens = entities::listen::Entity::find()
            .filter(entities::listen::Column::TrackId.eq("t2"))
            .all(&db.conn)
            .await
            .unwrap();
        assert!(t2_listens.is_empty());
        let t3_listens = entities::listen::Entity::find()
            .filter(entities::listen::Column::TrackId.eq("t3"))
            .all(&db.conn)
            .await
            .unwrap();
        assert_eq!(t3_listens.len(), 1);
    }

    #[tokio::test]
    async fn test_same_track_twice_in_one_page_creates_one_track() {
        let db = test_db().await;

        let report = sync(
            &db,
            vec![
                play("t1", "2024-03-01T10:10:00Z"),
                play("t1", "2024-03-01T10:00:00Z"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.tracks_added, 1);
        assert_eq!(report.listens_added, 2);
        assert_eq!(track_count(&db).await, 1);

        let listens = entities::listen::Entity::find()
            .all(&db.conn)
            .await
            .unwrap();
        assert_eq!(listens.len(), 2);
        assert!(listens.iter().all(|listen| listen.track_id == "t1"));
    }

    #[tokio::test]
    async fn test_duplicate_play_in_one_page_is_recorded_once() {
        let db = test_db().await;

        let report = sync(
            &db,
            vec![
                play("t1", "2024-03-01T10:00:00Z"),
                play("t1", "2024-03-01T10:00:00.000Z"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.listens_added, 1);
        assert_eq!(report.already_recorded, 1);
        assert_eq!(listen_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_failed_candidate_does_not_abort_run() {
        let db = test_db().await;

        let report = sync(
            &db,
            vec![
                play("t1", "2024-03-01T10:10:00Z"),
                Err(CandidateError::ArtistLookup {
                    track: "Track t2".into(),
                    artist_id: "artist-b".into(),
                    reason: "503 Service Unavailable".into(),
                }),
                play("t3", "2024-03-01T10:00:00Z"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.tracks_added, 2);
        assert_eq!(report.listens_added, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(listen_count(&db).await, 2);
    }

    #[tokio::test]
    async fn test_unparsable_played_at_is_skipped() {
        let db = test_db().await;

        let report = sync(
            &db,
            vec![
                play("t1", "sometime on tuesday"),
                play("t2", "2024-03-01T10:00:00Z"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.listens_added, 1);
        assert_eq!(report.tracks_added, 1);
        assert_eq!(track_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_naive_fetched_played_at_is_treated_as_utc() {
        let db = test_db().await;
        sync(&db, vec![play("t1", "2024-03-01T10:05:00Z")])
            .await
            .unwrap();

        let report = sync(
            &db,
            vec![
                play("t1", "2024-03-01T10:05:00"),
                play("t1", "2024-03-01T10:06:00"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.already_recorded, 1);
        assert_eq!(report.listens_added, 1);

        let stored = ListenLedger::new(&db.conn).max_played_at().await.unwrap();
        assert_eq!(stored.as_deref(), Some("2024-03-01T10:06:00.000000Z"));
    }

    #[tokio::test]
    async fn test_naive_stored_watermark_is_treated_as_utc() {
        let db = test_db().await;
        let track = TrackRepository::new(&db.conn)
            .create(&make_track("t1", "Track 1"))
            .await
            .unwrap();
        let legacy = entities::listen::ActiveModel {
            track_id: Set(track.spotify_id),
            played_at: Set("2024-03-01 10:05:00.000000".into()),
            ..entities::listen::ActiveModel::new()
        };
        entities::listen::Entity::insert(legacy)
            .exec(&db.conn)
            .await
            .unwrap();

        let report = sync(
            &db,
            vec![
                play("t1", "2024-03-01T10:05:00.000Z"),
                play("t1", "2024-03-01T10:07:00.000Z"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(report.already_recorded, 1);
        assert_eq!(report.listens_added, 1);
        assert_eq!(listen_count(&db).await, 2);
    }

    #[tokio::test]
    async fn test_existing_track_is_not_refreshed() {
        let db = test_db().await;
        sync(&db, vec![play("t1", "2024-03-01T10:00:00Z")])
            .await
            .unwrap();

        let mut renamed = make_track("t1", "Renamed");
        renamed.popularity = 99;
        let report = sync(
            &db,
            vec![Ok(SpotifyApiPlay {
                track: renamed,
                played_at: "2024-03-01T10:30:00Z".into(),
            })],
        )
        .await
        .unwrap();

        assert_eq!(report.tracks_added, 0);
        assert_eq!(report.listens_added, 1);
        let track = entities::track::Entity::find()
            .filter(entities::track::Column::SpotifyId.eq("t1"))
            .one(&db.conn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(track.name, "Track t1");
        assert_eq!(track.popularity, 42);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_run() {
        let db = test_db().await;
        let mut client = MockSpotifyClient::new();
        client
            .expect_recently_played()
            .returning(|_| Err(eyre!("401 Unauthorized")));

        let result = ListenSyncService::new(db.clone(), client).run_once().await;

        assert!(result.is_err());
        assert_eq!(listen_count(&db).await, 0);
        assert_eq!(track_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_storage_failure_rolls_back_whole_run() {
        let db = test_db().await;
        // Tracks can still be written, every listen insert fails
        sea_orm::ConnectionTrait::execute_unprepared(
            &db.conn,
            "CREATE TRIGGER reject_listens BEFORE INSERT ON listens \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .await
        .unwrap();

        let result = sync(
            &db,
            vec![
                play("t1", "2024-03-01T10:10:00Z"),
                play("t2", "2024-03-01T10:00:00Z"),
            ],
        )
        .await;

        assert!(result.is_err());
        assert_eq!(track_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_page_size_is_passed_and_clamped() {
        let db = test_db().await;
        let mut client = MockSpotifyClient::new();
        client
            .expect_recently_played()
            .withf(|limit| *limit == 50)
            .times(1)
            .returning(|_| Ok(vec![]));

        let report = ListenSyncService::new(db, client)
            .with_page_size(500)
            .run_once()
            .await
            .unwrap();

        assert_eq!(report, SyncReport::default());
    }
}
