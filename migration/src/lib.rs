pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_tracks;
mod m20250301_000002_create_listens;
mod m20250309_000001_create_spotify_account;
mod m20250316_000001_unique_listen_per_play;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_tracks::Migration),
            Box::new(m20250301_000002_create_listens::Migration),
            Box::new(m20250309_000001_create_spotify_account::Migration),
            Box::new(m20250316_000001_unique_listen_per_play::Migration),
        ]
    }
}
