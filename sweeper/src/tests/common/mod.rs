use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering::Relaxed},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use axum::{
    extract::{Path as UrlPath, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use google_gmail1::api::{ListMessagesResponse, Message, MessagePart, MessagePartHeader};
use lib_email_clients::gmail::TRASH_LABEL;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use crate::{
    email::MailboxApi,
    error::{ApiError, ApiResult},
    server_config::{GmailConfig, PacingConfig, PacingMode, SweeperConfig},
};

pub fn message_from(id: &str, from: &str) -> Message {
    Message {
        id: Some(id.to_string()),
        payload: Some(MessagePart {
            headers: Some(vec![MessagePartHeader {
                name: Some("From".to_string()),
                value: Some(from.to_string()),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn message_with_labels(id: &str, labels: &[&str]) -> Message {
    Message {
        id: Some(id.to_string()),
        label_ids: Some(labels.iter().map(|l| l.to_string()).collect()),
        ..Default::default()
    }
}

fn page_token_at(index: usize) -> String {
    format!("page-{index}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashBehaviour {
    Trashed,
    /// The call succeeds but the message comes back without the trash label.
    NotTrashed,
    Fail,
    /// Rate limited for the first n attempts, trashed afterwards.
    RateLimited(usize),
}

/// In-memory mailbox. Messages are trashed successfully unless told otherwise.
#[derive(Default)]
pub struct FakeMailbox {
    pages: Vec<Vec<String>>,
    senders: HashMap<String, String>,
    failing_gets: HashSet<String>,
    headerless: HashSet<String>,
    failing_list: Option<usize>,
    trash: HashMap<String, TrashBehaviour>,
    trash_attempts: Mutex<HashMap<String, usize>>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    trash_calls: AtomicUsize,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, ids: &[&str]) -> Self {
        self.pages
            .push(ids.iter().map(|id| id.to_string()).collect());
        self
    }

    pub fn sender(mut self, id: &str, from: &str) -> Self {
        self.senders.insert(id.to_string(), from.to_string());
        self
    }

    pub fn failing_get(mut self, id: &str) -> Self {
        self.failing_gets.insert(id.to_string());
        self
    }

    pub fn headerless(mut self, id: &str) -> Self {
        self.headerless.insert(id.to_string());
        self
    }

    /// The `call`-th listing (counting from 1) fails.
    pub fn failing_list(mut self, call: usize) -> Self {
        self.failing_list = Some(call);
        self
    }

    pub fn trash(mut self, id: &str, behaviour: TrashBehaviour) -> Self {
        self.trash.insert(id.to_string(), behaviour);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Relaxed)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Relaxed)
    }

    pub fn trash_calls(&self) -> usize {
        self.trash_calls.load(Relaxed)
    }
}

fn server_error(message: &str) -> ApiError {
    ApiError::Status {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.to_string(),
    }
}

#[async_trait]
impl MailboxApi for FakeMailbox {
    async fn list_messages(&self, page_token: Option<&str>) -> ApiResult<ListMessagesResponse> {
        let call = self.list_calls.fetch_add(1, Relaxed) + 1;
        if self.failing_list == Some(call) {
            return Err(server_error("list failed"));
        }

        let index = page_token
            .and_then(|t| t.strip_prefix("page-"))
            .and_then(|i| i.parse::<usize>().ok())
            .unwrap_or(0);
        let ids = self.pages.get(index).cloned().unwrap_or_default();
        let next_page_token = (index + 1 < self.pages.len()).then(|| page_token_at(index + 1));

        Ok(ListMessagesResponse {
            messages: Some(
                ids.into_iter()
                    .map(|id| Message {
                        id: Some(id),
                        ..Default::default()
                    })
                    .collect(),
            ),
            next_page_token,
            ..Default::default()
        })
    }

    async fn get_message_metadata(&self, message_id: &str) -> ApiResult<Message> {
        self.get_calls.fetch_add(1, Relaxed);
        if self.failing_gets.contains(message_id) {
            return Err(server_error("get failed"));
        }
        if self.headerless.contains(message_id) {
            return Ok(Message {
                id: Some(message_id.to_string()),
                payload: Some(MessagePart::default()),
                ..Default::default()
            });
        }

        match self.senders.get(message_id) {
            Some(from) => Ok(message_from(message_id, from)),
            None => Err(ApiError::Status {
                status: StatusCode::NOT_FOUND,
                message: "not found".to_string(),
            }),
        }
    }

    async fn trash_message(&self, message_id: &str) -> ApiResult<Message> {
        self.trash_calls.fetch_add(1, Relaxed);
        let attempt = {
            let mut attempts = self.trash_attempts.lock().unwrap();
            let attempt = attempts.entry(message_id.to_string()).or_insert(0);
            *attempt += 1;
            *attempt
        };

        match self
            .trash
            .get(message_id)
            .copied()
            .unwrap_or(TrashBehaviour::Trashed)
        {
            TrashBehaviour::Trashed => Ok(message_with_labels(message_id, &[TRASH_LABEL])),
            TrashBehaviour::NotTrashed => Ok(message_with_labels(message_id, &["INBOX"])),
            TrashBehaviour::Fail => Err(server_error("backend error")),
            TrashBehaviour::RateLimited(times) if attempt <= times => {
                Err(ApiError::RateLimited { retry_after: None })
            }
            TrashBehaviour::RateLimited(_) => Ok(message_with_labels(message_id, &[TRASH_LABEL])),
        }
    }
}

pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub fn test_config(dir: &Path, redirect_port: u16) -> SweeperConfig {
    SweeperConfig {
        credentials_path: dir.join("credentials.json").display().to_string(),
        token_cache_path: dir.join("token.json").display().to_string(),
        redirect_host: "127.0.0.1".to_string(),
        redirect_port,
        auth_timeout_secs: 5,
        page_size: Some(500),
        progress_every: 10,
        quota_per_second: 250,
        pacing: PacingConfig {
            mode: PacingMode::Fixed,
            delay_ms: 100,
            max_backoff_ms: 32_000,
            max_retries: 5,
        },
    }
}

pub fn gmail_config(token_server: SocketAddr) -> GmailConfig {
    GmailConfig {
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
        auth_uri: "https://accounts.example.com/o/oauth2/auth".to_string(),
        token_uri: format!("http://{token_server}/token"),
    }
}

pub const GOOD_CODE: &str = "good-code";
pub const REFRESH_TOKEN: &str = "refresh-1";

/// Number of requests the fake token endpoint served.
#[derive(Clone, Default)]
pub struct TokenServerCalls(Arc<AtomicUsize>);

impl TokenServerCalls {
    pub fn count(&self) -> usize {
        self.0.load(Relaxed)
    }
}

#[derive(Deserialize)]
struct TokenForm {
    grant_type: String,
    code: Option<String>,
    refresh_token: Option<String>,
}

async fn handler_token(
    State(calls): State<TokenServerCalls>,
    Form(form): Form<TokenForm>,
) -> Response {
    calls.0.fetch_add(1, Relaxed);

    match form.grant_type.as_str() {
        "authorization_code" if form.code.as_deref() == Some(GOOD_CODE) => Json(json!({
            "access_token": "access-1",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": REFRESH_TOKEN,
            "scope": "https://www.googleapis.com/auth/gmail.modify",
        }))
        .into_response(),
        "refresh_token" if form.refresh_token.as_deref() == Some(REFRESH_TOKEN) => Json(json!({
            "access_token": "access-2",
            "token_type": "Bearer",
            "expires_in": 3600,
        }))
        .into_response(),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant" })),
        )
            .into_response(),
    }
}

/// Fake OAuth token endpoint at `/token`. Accepts [`GOOD_CODE`] and
/// [`REFRESH_TOKEN`], rejects everything else with `invalid_grant`.
pub async fn spawn_token_server() -> (SocketAddr, TokenServerCalls) {
    let calls = TokenServerCalls::default();
    let router = Router::new()
        .route("/token", post(handler_token))
        .with_state(calls.clone());
    (spawn_server(router).await, calls)
}

/// Bearer tokens presented to the fake Gmail server, in order.
#[derive(Clone, Default)]
pub struct SeenTokens(Arc<Mutex<Vec<String>>>);

impl SeenTokens {
    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn record(&self, headers: &HeaderMap) {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default()
            .to_string();
        self.0.lock().unwrap().push(token);
    }
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(rename = "pageToken")]
    page_token: Option<String>,
}

async fn handler_list(
    State(seen): State<SeenTokens>,
    headers: HeaderMap,
    axum::extract::Query(query): axum::extract::Query<ListQuery>,
) -> Json<serde_json::Value> {
    seen.record(&headers);
    match query.page_token.as_deref() {
        None => Json(json!({
            "messages": [{ "id": "m1", "threadId": "t1" }, { "id": "m2", "threadId": "t2" }],
            "nextPageToken": "second",
            "resultSizeEstimate": 3,
        })),
        Some(_) => Json(json!({
            "messages": [{ "id": "m3", "threadId": "t3" }],
            "resultSizeEstimate": 3,
        })),
    }
}

async fn handler_get(
    State(seen): State<SeenTokens>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Response {
    seen.record(&headers);
    let from = match id.as_str() {
        "m1" | "m3" => "Alice <alice@example.com>",
        "m2" => "bob@example.com",
        _ => return (StatusCode::NOT_FOUND, "not found").into_response(),
    };
    Json(json!({
        "id": id,
        "payload": { "headers": [{ "name": "From", "value": from }] },
    }))
    .into_response()
}

async fn handler_trash(
    State(seen): State<SeenTokens>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
) -> Response {
    seen.record(&headers);
    match id.as_str() {
        "limited" => (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "7")], "slow down")
            .into_response(),
        "quota" => (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": { "errors": [{ "reason": "userRateLimitExceeded" }] } })),
        )
            .into_response(),
        "missing" => (StatusCode::NOT_FOUND, "Requested entity was not found.").into_response(),
        _ => Json(json!({ "id": id, "labelIds": [TRASH_LABEL] })).into_response(),
    }
}

/// Fake Gmail API rooted at the returned address: two pages of messages
/// (m1, m2 then m3), metadata for each, and a trash endpoint with a few
/// special ids (`limited`, `quota`, `missing`).
pub async fn spawn_gmail_server() -> (SocketAddr, SeenTokens) {
    let seen = SeenTokens::default();
    let router = Router::new()
        .route("/messages", get(handler_list))
        .route("/messages/:id", get(handler_get))
        .route("/messages/:id/trash", post(handler_trash))
        .with_state(seen.clone());
    (spawn_server(router).await, seen)
}
