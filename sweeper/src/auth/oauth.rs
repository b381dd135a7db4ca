use lib_email_clients::gmail::{AccessScopes, REQUIRED_SCOPES};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::{AuthError, AuthResult},
    server_config::GmailConfig,
    HttpClient,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct GmailApiTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: String,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GmailApiRefreshTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

pub fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// URL the user opens to grant access. `prompt=consent` makes Google hand out
/// a refresh token even if the app was authorized before.
pub fn authorization_url(
    http_client: &HttpClient,
    gmail: &GmailConfig,
    redirect_uri: &str,
    state: &str,
) -> AuthResult<Url> {
    let scopes = AccessScopes::join(&REQUIRED_SCOPES);
    let req = http_client
        .get(&gmail.auth_uri)
        .query(&[
            ("client_id", gmail.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scopes.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ])
        .build()
        .map_err(|e| AuthError::ExchangeFailed(format!("invalid authorization endpoint: {e}")))?;

    Ok(req.url().clone())
}

/// Required scopes the user did not grant, given the space separated `scope`
/// value of a token response.
pub fn missing_scopes(granted: &str) -> Vec<AccessScopes> {
    let granted = granted
        .split_whitespace()
        .filter_map(|s| s.parse::<AccessScopes>().ok())
        .collect::<Vec<_>>();

    REQUIRED_SCOPES
        .into_iter()
        .filter(|scope| !granted.contains(scope))
        .collect()
}

pub async fn exchange_code(
    http_client: &HttpClient,
    gmail: &GmailConfig,
    redirect_uri: &str,
    code: &str,
) -> AuthResult<GmailApiTokenResponse> {
    let resp = http_client
        .post(&gmail.token_uri)
        .form(&[
            ("client_id", gmail.client_id.as_str()),
            ("client_secret", gmail.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::ExchangeFailed(format!("{status}: {body}")));
    }

    let resp: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;
    serde_json::from_value(resp).map_err(|e| {
        tracing::error!("Failed to parse token response: {}", e);
        AuthError::ExchangeFailed(format!("unexpected token response: {e}"))
    })
}

pub async fn exchange_refresh_token(
    http_client: &HttpClient,
    gmail: &GmailConfig,
    refresh_token: &str,
) -> AuthResult<GmailApiRefreshTokenResponse> {
    let resp = http_client
        .post(&gmail.token_uri)
        .form(&[
            ("client_id", gmail.client_id.as_str()),
            ("client_secret", gmail.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::RefreshFailed(format!("{status}: {body}")));
    }

    resp.json()
        .await
        .map_err(|e| AuthError::RefreshFailed(format!("unexpected token response: {e}")))
}
