//! Token lifecycle: reuse the cached credential when there is one, otherwise
//! run the browser authorization once and cache the result.

mod callback;
mod credential;
mod oauth;
mod token;

pub use callback::CallbackListener;
pub use credential::{Credential, TokenStore};
pub use token::TokenKeeper;

use chrono::Utc;
use indoc::printdoc;
use url::Url;

use crate::{
    email::GmailClient,
    error::{AuthError, AuthResult},
    server_config::{GmailConfig, SweeperConfig},
    HttpClient,
};

pub async fn obtain_transport(
    config: &SweeperConfig,
    gmail: GmailConfig,
    http_client: HttpClient,
) -> AuthResult<GmailClient> {
    obtain_transport_with(config, gmail, http_client, |url| {
        printdoc! {"
            Please visit the following URL to authorize this application:
            {url}
            "}
    })
    .await
}

/// Same as [`obtain_transport`], with the authorization URL handed to
/// `present` instead of printed.
pub async fn obtain_transport_with<P>(
    config: &SweeperConfig,
    gmail: GmailConfig,
    http_client: HttpClient,
    present: P,
) -> AuthResult<GmailClient>
where
    P: FnOnce(&Url),
{
    let store = TokenStore::new(&config.token_cache_path);

    let credential = match store.load().await {
        Some(credential) => {
            tracing::info!("Using cached token from {}", store.path().display());
            credential
        }
        None => {
            let credential = authorize(config, &gmail, &http_client, present).await?;
            if let Err(e) = store.save(&credential).await {
                tracing::warn!(
                    "Could not save token to {}, it will only last this run: {}",
                    store.path().display(),
                    e
                );
            }
            credential
        }
    };

    let tokens = TokenKeeper::new(http_client.clone(), gmail, store, credential);
    Ok(GmailClient::new(
        http_client,
        tokens,
        config.quota_per_second,
        config.page_size,
    ))
}

async fn authorize<P>(
    config: &SweeperConfig,
    gmail: &GmailConfig,
    http_client: &HttpClient,
    present: P,
) -> AuthResult<Credential>
where
    P: FnOnce(&Url),
{
    let state = oauth::random_state();
    let mut listener =
        CallbackListener::bind(&config.redirect_host, config.redirect_port, &state).await?;
    let redirect_uri = listener.redirect_uri();

    let result = async {
        let url = oauth::authorization_url(http_client, gmail, &redirect_uri, &state)?;
        present(&url);

        let code = listener.wait(config.auth_timeout()).await?;
        tracing::info!("Authorization code received, exchanging it for a token");
        let resp = oauth::exchange_code(http_client, gmail, &redirect_uri, &code).await?;
        if let Some(missing) = resp
            .scope
            .as_deref()
            .map(oauth::missing_scopes)
            .filter(|missing| !missing.is_empty())
        {
            tracing::warn!("Some required scopes were not granted: {:?}", missing);
        }

        Ok::<_, AuthError>(Credential::from_token_response(resp, Utc::now()))
    }
    .await;

    listener.shutdown().await;
    result
}
