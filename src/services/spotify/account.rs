use std::sync::Arc;

use color_eyre::eyre::{OptionExt, Result, WrapErr};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::config::SpotifyConfig;
use crate::database::Database;
use crate::entities;
use crate::spotify_rs::auth::{
    AuthorizationRequest, authorization_request, exchange_code_for_token, parse_callback,
    refresh_access_token,
};
use crate::spotify_rs::client::SpotifyWebApi;
use crate::spotify_rs::types::{SpotifyTokenResponse, SpotifyUser};

/// Refresh this many seconds before Spotify would reject the token
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

fn needs_refresh(token_expiry: i64, now: i64) -> bool {
    token_expiry - TOKEN_EXPIRY_MARGIN_SECS <= now
}

pub struct SpotifyAccountService {
    db: Arc<Database>,
    credentials: SpotifyConfig,
}

impl SpotifyAccountService {
    pub fn new(db: Arc<Database>, credentials: SpotifyConfig) -> Self {
        Self { db, credentials }
    }

    /// First half of the login: the URL to send the user to.
    pub fn start_login(&self) -> AuthorizationRequest {
        authorization_request(&self.credentials.client_id, &self.credentials.redirect_uri)
    }

    /// Second half of the login: trade the callback for tokens and remember the account.
    pub async fn complete_login(
        &self,
        request: &AuthorizationRequest,
        callback_url: &str,
    ) -> Result<entities::spotify_account::Model> {
        let code = parse_callback(callback_url, &request.state)?;

        let tokens = exchange_code_for_token(
            &self.credentials.client_id,
            &self.credentials.client_secret,
            &code,
            &self.credentials.redirect_uri,
        )
        .await
        .wrap_err("Failed to exchange authorization code")?;

        let user = SpotifyWebApi::new(tokens.access_token.clone())
            .get_current_user()
            .await
            .wrap_err("Failed to get user info")?;

        self.upsert_account(user, tokens).await
    }

    pub async fn upsert_account(
        &self,
        user: SpotifyUser,
        tokens: SpotifyTokenResponse,
    ) -> Result<entities::spotify_account::Model> {
        let token_expiry = chrono::Utc::now().timestamp() + tokens.expires_in as i64;

        let existing_account = entities::spotify_account::Entity::find()
            .filter(entities::spotify_account::Column::UserId.eq(&user.id))
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to check for existing spotify account")?;

        let account = if let Some(existing) = existing_account {
            let refresh_token = tokens
                .refresh_token
                .unwrap_or_else(|| existing.refresh_token.clone());

            let mut account: entities::spotify_account::ActiveModel = existing.into();
            account.display_name = Set(user.display_name);
            account.access_token = Set(tokens.access_token);
            account.refresh_token = Set(refresh_token);
            account.token_expiry = Set(token_expiry);
            account.scope = Set(tokens.scope);

            account
                .update(&self.db.conn)
                .await
                .wrap_err("Failed to update spotify account")?
        } else {
            let refresh_token = tokens
                .refresh_token
                .ok_or_eyre("Spotify did not return a refresh token")?;

            let account = entities::spotify_account::ActiveModel {
                user_id: Set(user.id),
                display_name: Set(user.display_name),
                access_token: Set(tokens.access_token),
                refresh_token: Set(refresh_token),
                token_expiry: Set(token_expiry),
                scope: Set(tokens.scope),
                ..entities::spotify_account::ActiveModel::new()
            };

            account
                .insert(&self.db.conn)
                .await
                .wrap_err("Failed to create spotify account")?
        };

        tracing::info!("Saved spotify account {}", account.user_id);
        Ok(account)
    }

    /// The requested account, or the first one that logged in.
    pub async fn find_account(
        &self,
        user_id: Option<&str>,
    ) -> Result<entities::spotify_account::Model> {
        let mut query = entities::spotify_account::Entity::find()
            .order_by_asc(entities::spotify_account::Column::Id);
        if let Some(user_id) = user_id {
            query = query.filter(entities::spotify_account::Column::UserId.eq(user_id));
        }

        query
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch spotify account")?
            .ok_or_eyre(match user_id {
                Some(user_id) => format!("No spotify account for user {}", user_id),
                None => "No spotify account found, run `listen-sync login` first".to_string(),
            })
    }

    /// A usable access token, refreshed and persisted if the stored one is (nearly)
    /// expired.
    pub async fn access_token(&self, user_id: Option<&str>) -> Result<String> {
        let account = self.find_account(user_id).await?;
        if !needs_refresh(account.token_expiry, chrono::Utc::now().timestamp()) {
            return Ok(account.access_token);
        }

        tracing::debug!("Refreshing access token for {}", account.user_id);
        let tokens = refresh_access_token(
            &self.credentials.client_id,
            &self.credentials.client_secret,
            &account.refresh_token,
        )
        .await
        .wrap_err("Failed to refresh spotify access token")?;

        let account = self.store_refreshed_tokens(account, tokens).await?;
        Ok(account.access_token)
    }

    async fn store_refreshed_tokens(
        &self,
        account: entities::spotify_account::Model,
        tokens: SpotifyTokenResponse,
    ) -> Result<entities::spotify_account::Model> {
        let token_expiry = chrono::Utc::now().timestamp() + tokens.expires_in as i64;

        let mut account: entities::spotify_account::ActiveModel = account.into();
        account.access_token = Set(tokens.access_token);
        // Spotify only sometimes rotates the refresh token
        if let Some(refresh_token) = tokens.refresh_token {
            account.refresh_token = Set(refresh_token);
        }
        account.token_expiry = Set(token_expiry);
        if !tokens.scope.is_empty() {
            account.scope = Set(tokens.scope);
        }

        account
            .update(&self.db.conn)
            .await
            .wrap_err("Failed to save refreshed spotify tokens")
    }
}
