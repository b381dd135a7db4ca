#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::{fs, io::AsyncWriteExt};

use super::oauth::{GmailApiRefreshTokenResponse, GmailApiTokenResponse};

/// Seconds before the real expiry at which the token is already refreshed.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expiry: DateTime<Utc>,
}

impl Credential {
    pub fn from_token_response(resp: GmailApiTokenResponse, now: DateTime<Utc>) -> Self {
        Credential {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expiry: now + Duration::seconds(resp.expires_in as i64),
        }
    }

    pub fn apply_refresh(&mut self, resp: GmailApiRefreshTokenResponse, now: DateTime<Utc>) {
        self.access_token = resp.access_token;
        self.expiry = now + Duration::seconds(resp.expires_in as i64);
        // Google only sends a new refresh token when it rotates the old one
        if let Some(refresh_token) = resp.refresh_token {
            self.refresh_token = refresh_token;
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now
    }

    fn is_well_formed(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

/// JSON file holding the cached [`Credential`].
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached credential. Anything unusable counts as "no cache".
    pub async fn load(&self) -> Option<Credential> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) => {
                tracing::info!("No cached token at {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<Credential>(&data) {
            Ok(credential) if credential.is_well_formed() => Some(credential),
            Ok(_) => {
                tracing::warn!("Cached token at {} is incomplete", self.path.display());
                None
            }
            Err(e) => {
                tracing::warn!("Cached token at {} is invalid: {}", self.path.display(), e);
                None
            }
        }
    }

    pub async fn save(&self, credential: &Credential) -> std::io::Result<()> {
        let data = serde_json::to_vec_pretty(credential)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.path).await?;
        // The open mode only applies to new files, so tighten an existing one too.
        #[cfg(unix)]
        fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        file.write_all(&data).await?;
        file.flush().await
    }
}
