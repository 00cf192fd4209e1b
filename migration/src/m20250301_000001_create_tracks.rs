use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tracks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tracks::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Tracks::SpotifyId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Tracks::Name).string().not_null())
                    .col(ColumnDef::new(Tracks::Artist).string().not_null())
                    .col(ColumnDef::new(Tracks::ArtistId).string().not_null())
                    // JSON array of genre names
                    .col(ColumnDef::new(Tracks::Genres).text().not_null())
                    .col(ColumnDef::new(Tracks::Album).string().not_null())
                    .col(ColumnDef::new(Tracks::AlbumId).string().not_null())
                    .col(ColumnDef::new(Tracks::DurationMs).integer().not_null())
                    .col(ColumnDef::new(Tracks::Popularity).integer().not_null())
                    .col(ColumnDef::new(Tracks::Tempo).double())
                    .col(ColumnDef::new(Tracks::Energy).double())
                    .col(ColumnDef::new(Tracks::Danceability).double())
                    .col(ColumnDef::new(Tracks::Valence).double())
                    .col(ColumnDef::new(Tracks::Acousticness).double())
                    .col(ColumnDef::new(Tracks::Instrumentalness).double())
                    .col(ColumnDef::new(Tracks::Key).integer())
                    .col(ColumnDef::new(Tracks::Mode).integer())
                    .col(ColumnDef::new(Tracks::TimeSignature).integer())
                    .col(
                        ColumnDef::new(Tracks::IsExplicit)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Tracks::PreviewUrl).string())
                    // JSON object, e.g. {"spotify": "https://open.spotify.com/track/..."}
                    .col(ColumnDef::new(Tracks::ExternalUrls).text().not_null())
                    .col(
                        ColumnDef::new(Tracks::CreatedAt)
                            .big_integer()
                            .not_null()
                            .default(Expr::cust("(strftime('%s', 'now'))")),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tracks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tracks {
    Table,
    Id,
    SpotifyId,
    Name,
    Artist,
    ArtistId,
    Genres,
    Album,
    AlbumId,
    DurationMs,
    Popularity,
    Tempo,
    Energy,
    Danceability,
    Valence,
    Acousticness,
    Instrumentalness,
    Key,
    Mode,
    TimeSignature,
    IsExplicit,
    PreviewUrl,
    ExternalUrls,
    CreatedAt,
}
