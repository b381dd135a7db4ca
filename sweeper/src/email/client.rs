use std::time::Duration;

use async_trait::async_trait;
use google_gmail1::api::{ListMessagesResponse, Message};
use leaky_bucket::RateLimiter;
use reqwest::{header, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    api_quota::GMAIL_API_QUOTA,
    auth::TokenKeeper,
    error::{ApiError, ApiResult},
    HttpClient,
};

pub const GMAIL_ENDPOINT: &str = "https://www.googleapis.com/gmail/v1/users/me";

macro_rules! gmail_url {
    ($base:expr, $($params:expr),*) => {
        {
            let list_params: Vec<&str> = vec![$($params),*];
            let path = list_params.join("/");
            format!("{}/{}", $base, path)
        }
    };
}

/// The three mailbox calls the harvester and the deletion executor rely on.
#[async_trait]
pub trait MailboxApi: Send + Sync {
    /// One page of message ids, starting at `page_token` when given.
    async fn list_messages(&self, page_token: Option<&str>) -> ApiResult<ListMessagesResponse>;

    /// Header-only view of a message, carrying just its `From` header.
    async fn get_message_metadata(&self, message_id: &str) -> ApiResult<Message>;

    /// Moves a message to the trash and returns it with its updated labels.
    async fn trash_message(&self, message_id: &str) -> ApiResult<Message>;
}

pub struct GmailClient {
    http_client: HttpClient,
    tokens: TokenKeeper,
    rate_limiter: RateLimiter,
    endpoint: String,
    page_size: Option<u32>,
}

impl GmailClient {
    pub fn new(
        http_client: HttpClient,
        tokens: TokenKeeper,
        quota_per_second: usize,
        page_size: Option<u32>,
    ) -> Self {
        let rate_limiter = RateLimiter::builder()
            .initial(quota_per_second)
            .interval(Duration::from_secs(1))
            .max(quota_per_second)
            .refill(quota_per_second)
            .build();

        Self {
            http_client,
            tokens,
            rate_limiter,
            endpoint: GMAIL_ENDPOINT.to_string(),
            page_size,
        }
    }

    /// Points the client at another Gmail-compatible base URL.
    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    #[cfg(test)]
    pub fn tokens(&self) -> &TokenKeeper {
        &self.tokens
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> ApiResult<T> {
        let access_token = self.tokens.access_token().await?;
        let resp = req.bearer_auth(access_token).send().await?;

        if resp.status().is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()));
        }

        Err(error_from_response(resp).await)
    }
}

async fn error_from_response(resp: Response) -> ApiError {
    let status = resp.status();
    match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited {
            retry_after: retry_after(&resp),
        },
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        _ => {
            let retry_after = retry_after(&resp);
            let message = resp.text().await.unwrap_or_default();
            // Gmail reports per-user rate limits as 403 with a rateLimitExceeded reason
            if status == StatusCode::FORBIDDEN
                && message.to_ascii_lowercase().contains("ratelimitexceeded")
            {
                ApiError::RateLimited { retry_after }
            } else {
                ApiError::Status { status, message }
            }
        }
    }
}

fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl MailboxApi for GmailClient {
    async fn list_messages(&self, page_token: Option<&str>) -> ApiResult<ListMessagesResponse> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_list)
            .await;

        let mut query = Vec::new();
        if let Some(page_size) = self.page_size {
            query.push(("maxResults", page_size.to_string()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let req = self
            .http_client
            .get(gmail_url!(self.endpoint, "messages"))
            .query(&query);
        self.send(req).await
    }

    async fn get_message_metadata(&self, message_id: &str) -> ApiResult<Message> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_get)
            .await;

        let req = self
            .http_client
            .get(gmail_url!(self.endpoint, "messages", message_id))
            .query(&[("format", "metadata"), ("metadataHeaders", "From")]);
        self.send(req).await
    }

    async fn trash_message(&self, message_id: &str) -> ApiResult<Message> {
        self.rate_limiter
            .acquire(GMAIL_API_QUOTA.messages_trash)
            .await;

        let req = self
            .http_client
            .post(gmail_url!(self.endpoint, "messages", message_id, "trash"))
            .header(header::CONTENT_LENGTH, 0);
        self.send(req).await
    }
}
