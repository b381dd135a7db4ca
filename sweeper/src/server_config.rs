use std::time::Duration;

use config::{
    builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File, FileFormat,
    FileSourceFile,
};
use lazy_static::lazy_static;
use serde::Deserialize;

use crate::api_quota::GMAIL_QUOTA_PER_SECOND;

pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const CALLBACK_PATH: &str = "/callback";

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// OAuth client identifiers downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct GmailConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    #[serde(alias = "installed")]
    web: GmailConfig,
}

impl GmailConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let file: ClientSecretFile = Config::builder()
            .add_source(File::new(path, FileFormat::Json))
            .build()?
            .try_deserialize()?;

        Ok(file.web)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingMode {
    Fixed,
    Adaptive,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    pub mode: PacingMode,
    pub delay_ms: u64,
    pub max_backoff_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    pub credentials_path: String,
    pub token_cache_path: String,
    pub redirect_host: String,
    pub redirect_port: u16,
    /// Zero waits for the authorization callback forever.
    pub auth_timeout_secs: u64,
    pub page_size: Option<u32>,
    pub progress_every: usize,
    pub quota_per_second: usize,
    pub pacing: PacingConfig,
}

impl SweeperConfig {
    /// Defaults, then `sweeper.toml` if present, then `SWEEPER_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_sources(
            File::with_name("sweeper").required(false),
            Environment::with_prefix("SWEEPER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }

    pub fn from_sources(
        file: File<FileSourceFile, FileFormat>,
        env: Environment,
    ) -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("credentials_path", "credentials.json")?
            .set_default("token_cache_path", "token.json")?
            .set_default("redirect_host", "localhost")?
            .set_default("redirect_port", 8080)?
            .set_default("auth_timeout_secs", 300)?
            .set_default("page_size", 500)?
            .set_default("progress_every", 10)?
            .set_default("quota_per_second", GMAIL_QUOTA_PER_SECOND as u64)?
            .set_default("pacing.mode", "fixed")?
            .set_default("pacing.delay_ms", 100)?
            .set_default("pacing.max_backoff_ms", 32_000)?
            .set_default("pacing.max_retries", 5)
    }

    pub fn redirect_uri(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.redirect_host, self.redirect_port, CALLBACK_PATH
        )
    }

    pub fn auth_timeout(&self) -> Option<Duration> {
        match self.auth_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl std::fmt::Display for SweeperConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "credentials: {}, token cache: {}, redirect: {}, pacing: {:?}",
            self.credentials_path,
            self.token_cache_path,
            self.redirect_uri(),
            self.pacing
        )
    }
}

lazy_static! {
    #[allow(non_upper_case_globals)]
    pub static ref cfg: SweeperConfig = SweeperConfig::load().expect("sweeper config is invalid");
}
