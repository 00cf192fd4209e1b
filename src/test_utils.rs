use std::sync::Arc;

use sea_orm::{ConnectOptions, Database as SeaDatabase};

use crate::database::Database;

/// Fresh in-memory database with every migration applied.
///
/// The pool is pinned to a single connection, otherwise each pooled connection
/// would see its own empty `:memory:` database.
pub async fn test_db() -> Arc<Database> {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);

    let conn = SeaDatabase::connect(opt).await.unwrap();
    let db = Database::from_connection(conn)
        .await
        .unwrap_or_else(|e| panic!("Failed to prepare test database: {:?}", e));

    Arc::new(db)
}
