use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Listens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Listens::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Listens::TrackId).string().not_null())
                    // RFC 3339 text, always UTC once written by us
                    .col(ColumnDef::new(Listens::PlayedAt).string().not_null())
                    .col(
                        ColumnDef::new(Listens::CreatedAt)
                            .big_integer()
                            .not_null()
                            .default(Expr::cust("(strftime('%s', 'now'))")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_listens_track_id")
                            .from(Listens::Table, Listens::TrackId)
                            .to(Tracks::Table, Tracks::SpotifyId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_listens_played_at")
                    .table(Listens::Table)
                    .col(Listens::PlayedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_listens_track_id")
                    .table(Listens::Table)
                    .col(Listens::TrackId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Listens::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Listens {
    Table,
    Id,
    TrackId,
    PlayedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Tracks {
    Table,
    SpotifyId,
}
