use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table("spotify_account")
                    .if_not_exists()
                    .col(pk_auto("id"))
                    .col(string("user_id").not_null().unique_key())
                    .col(string_null("display_name"))
                    .col(string("access_token").not_null())
                    .col(string("refresh_token").not_null())
                    .col(big_integer("token_expiry").not_null())
                    .col(string("scope").not_null())
                    .col(big_integer("created_at").not_null())
                    .col(big_integer("updated_at").not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table("spotify_account").to_owned())
            .await
    }
}
