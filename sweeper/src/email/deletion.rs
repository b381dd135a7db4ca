use std::{fmt, sync::Arc};

use lib_email_clients::gmail::TRASH_LABEL;

use super::client::MailboxApi;
use crate::{error::DeletionError, pacing::PacingPolicy, server_config::SweeperConfig};

pub const DEFAULT_PROGRESS_EVERY: usize = 10;

/// Called with the cumulative number of successful deletions.
pub type ProgressCallback = Arc<dyn Fn(usize) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionFailure {
    pub message_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<DeletionFailure>,
}

impl DeletionOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.message_id.clone()).collect()
    }

    fn fail(&mut self, message_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!("Could not delete message {message_id}: {reason}");
        self.failures.push(DeletionFailure {
            message_id: message_id.to_string(),
            reason,
        });
    }
}

impl fmt::Display for DeletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} moved to trash, {} failed",
            self.succeeded,
            self.attempted,
            self.failures.len()
        )
    }
}

/// Moves messages to the trash one at a time, pacing the calls.
pub struct BatchDeleter {
    pacing: PacingPolicy,
    progress_every: usize,
    on_progress: Option<ProgressCallback>,
}

impl Default for BatchDeleter {
    fn default() -> Self {
        Self::new(PacingPolicy::default())
    }
}

impl BatchDeleter {
    pub fn new(pacing: PacingPolicy) -> Self {
        Self {
            pacing,
            progress_every: DEFAULT_PROGRESS_EVERY,
            on_progress: None,
        }
    }

    pub fn from_config(config: &SweeperConfig) -> Self {
        Self::new(PacingPolicy::from(&config.pacing)).progress_every(config.progress_every)
    }

    /// Zero disables progress reports.
    pub fn progress_every(mut self, every: usize) -> Self {
        self.progress_every = every;
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Trashes every id in order. A failure on one id never stops the batch;
    /// if any id failed, the whole outcome is returned inside
    /// [`DeletionError::Partial`].
    pub async fn delete_all<A>(
        &self,
        api: &A,
        message_ids: &[String],
    ) -> Result<DeletionOutcome, DeletionError>
    where
        A: MailboxApi + ?Sized,
    {
        let mut outcome = DeletionOutcome {
            attempted: message_ids.len(),
            ..Default::default()
        };

        for id in message_ids {
            let mut retry = 0;
            let result = loop {
                let result = api.trash_message(id).await;
                if let Err(e) = &result {
                    if let Some(wait) = self.pacing.backoff(retry + 1, e) {
                        retry += 1;
                        tracing::info!("Rate limited on {id}, retry {retry} in {wait:?}");
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                }
                break result;
            };

            match result {
                Ok(message) => {
                    let trashed = message
                        .label_ids
                        .as_ref()
                        .is_some_and(|labels| labels.iter().any(|l| l == TRASH_LABEL));
                    if trashed {
                        outcome.succeeded += 1;
                        self.report_progress(outcome.succeeded, outcome.attempted);
                    } else {
                        outcome.fail(id, "not moved to trash");
                    }
                }
                Err(e) => outcome.fail(id, e.to_string()),
            }

            tokio::time::sleep(self.pacing.delay()).await;
        }

        if outcome.is_complete() {
            Ok(outcome)
        } else {
            Err(DeletionError::Partial(outcome))
        }
    }

    fn report_progress(&self, succeeded: usize, attempted: usize) {
        if self.progress_every == 0 || succeeded % self.progress_every != 0 {
            return;
        }

        tracing::info!("Deleted {succeeded} of {attempted} messages");
        if let Some(callback) = &self.on_progress {
            callback(succeeded);
        }
    }
}
