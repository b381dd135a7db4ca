use chrono::Utc;
use tokio::sync::Mutex;

use super::{
    credential::{Credential, TokenStore},
    oauth::exchange_refresh_token,
};
use crate::{error::AuthResult, server_config::GmailConfig, HttpClient};

/// Owns the live credential and hands out access tokens, refreshing them
/// transparently once they expire.
pub struct TokenKeeper {
    http_client: HttpClient,
    gmail: GmailConfig,
    store: TokenStore,
    credential: Mutex<Credential>,
}

impl TokenKeeper {
    pub fn new(
        http_client: HttpClient,
        gmail: GmailConfig,
        store: TokenStore,
        credential: Credential,
    ) -> Self {
        Self {
            http_client,
            gmail,
            store,
            credential: Mutex::new(credential),
        }
    }

    pub async fn access_token(&self) -> AuthResult<String> {
        let mut credential = self.credential.lock().await;

        if credential.is_expired_at(Utc::now()) {
            tracing::info!("Access token expired, refreshing");
            let resp =
                exchange_refresh_token(&self.http_client, &self.gmail, &credential.refresh_token)
                    .await?;
            credential.apply_refresh(resp, Utc::now());

            if let Err(e) = self.store.save(&credential).await {
                tracing::warn!(
                    "Could not save refreshed token to {}: {}",
                    self.store.path().display(),
                    e
                );
            }
        }

        Ok(credential.access_token.clone())
    }

    #[cfg(test)]
    pub async fn credential(&self) -> Credential {
        self.credential.lock().await.clone()
    }
}
