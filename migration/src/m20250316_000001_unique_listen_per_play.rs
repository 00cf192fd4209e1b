use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// The watermark check decides what gets inserted; this index only guarantees that
/// two overlapping runs cannot both record the same play.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_listens_track_id_played_at")
                    .table(Listens::Table)
                    .col(Listens::TrackId)
                    .col(Listens::PlayedAt)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_listens_track_id_played_at")
                    .table(Listens::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Listens {
    Table,
    TrackId,
    PlayedAt,
}
