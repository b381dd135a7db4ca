use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{AuthError, AuthResult},
    request_tracing,
    server_config::CALLBACK_PATH,
};

/// How long in-flight callback connections get to finish once we stop.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Single slot for the one callback an authorization attempt may receive.
type PendingAuthorization = Arc<Mutex<Option<oneshot::Sender<AuthResult<String>>>>>;

#[derive(Clone)]
struct CallbackState {
    pending: PendingAuthorization,
    expected_state: Arc<str>,
}

#[derive(Deserialize, Debug)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub state: Option<String>,
}

async fn handler_callback(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
) -> (StatusCode, &'static str) {
    tracing::info!(
        has_code = query.code.is_some(),
        error = ?query.error,
        "Authorization callback received"
    );

    let Some(sender) = state
        .pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    else {
        return (StatusCode::CONFLICT, "Authorization already received.\n");
    };

    let (response, outcome) = match query {
        CallbackQuery { code: None, error, .. } => (
            (StatusCode::BAD_REQUEST, "No code provided.\n"),
            Err(AuthError::NoCodeInCallback(error)),
        ),
        CallbackQuery {
            state: returned, ..
        } if returned.as_deref() != Some(&*state.expected_state) => (
            (StatusCode::BAD_REQUEST, "State does not match.\n"),
            Err(AuthError::InvalidState),
        ),
        CallbackQuery {
            code: Some(code), ..
        } => (
            (StatusCode::OK, "Authorisation successful, you can close this tab.\n"),
            Ok(code),
        ),
    };

    if sender.send(outcome).is_err() {
        tracing::warn!("Authorization callback arrived after the wait was abandoned");
    }

    response
}

/// Loopback HTTP listener serving the OAuth redirect for one authorization
/// attempt. The port is released when [`CallbackListener::shutdown`] runs or
/// the listener is dropped.
pub struct CallbackListener {
    host: String,
    local_addr: SocketAddr,
    receiver: Option<oneshot::Receiver<AuthResult<String>>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CallbackListener {
    pub async fn bind(host: &str, port: u16, expected_state: &str) -> AuthResult<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| AuthError::ListenerFailed(format!("cannot bind {host}:{port}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AuthError::ListenerFailed(e.to_string()))?;

        let (sender, receiver) = oneshot::channel();
        let router = Router::new()
            .route(CALLBACK_PATH, get(handler_callback))
            .layer(request_tracing::trace_with_request_id_layer())
            .with_state(CallbackState {
                pending: Arc::new(Mutex::new(Some(sender))),
                expected_state: Arc::from(expected_state),
            });

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                tracing::error!("Callback listener error: {:?}", e);
            }
        });

        tracing::debug!("Callback listener bound to {local_addr}");

        Ok(Self {
            host: host.to_string(),
            local_addr,
            receiver: Some(receiver),
            cancel,
            handle: Some(handle),
        })
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Redirect URI matching the bound port. Must equal one of the URIs
    /// registered for the OAuth client.
    pub fn redirect_uri(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.host,
            self.local_addr.port(),
            CALLBACK_PATH
        )
    }

    /// Blocks until the callback fires, or until `timeout` elapses.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> AuthResult<String> {
        let receiver = self
            .receiver
            .take()
            .ok_or_else(|| AuthError::ListenerFailed("callback already consumed".to_string()))?;

        let received = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, receiver)
                .await
                .map_err(|_| AuthError::Timeout(timeout))?,
            None => receiver.await,
        };

        received.map_err(|_| {
            AuthError::ListenerFailed("listener stopped before a callback arrived".to_string())
        })?
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let Some(mut handle) = self.handle.take() else {
            return;
        };

        match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
            Ok(Ok(())) => tracing::debug!("Callback listener stopped"),
            Ok(Err(e)) => tracing::warn!("Callback listener task failed: {:?}", e),
            Err(_) => {
                tracing::warn!("Callback listener did not stop in time, aborting it");
                handle.abort();
            }
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
