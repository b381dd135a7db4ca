use std::time::Duration;

use crate::{
    error::ApiError,
    server_config::{PacingConfig, PacingMode},
};

pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

/// How the deletion executor spaces out its calls to stay under the
/// service's rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingPolicy {
    /// Sleep `delay` after every attempt and never retry.
    Fixed { delay: Duration },
    /// Sleep `delay` after every attempt, and when the service answers with a
    /// rate limit, wait as told (or back off exponentially) and try again.
    /// No single wait exceeds `max_backoff`.
    Adaptive {
        delay: Duration,
        max_backoff: Duration,
        max_retries: u32,
    },
}

impl Default for PacingPolicy {
    fn default() -> Self {
        PacingPolicy::Fixed {
            delay: DEFAULT_DELAY,
        }
    }
}

impl From<&PacingConfig> for PacingPolicy {
    fn from(config: &PacingConfig) -> Self {
        let delay = Duration::from_millis(config.delay_ms);
        match config.mode {
            PacingMode::Fixed => PacingPolicy::Fixed { delay },
            PacingMode::Adaptive => PacingPolicy::Adaptive {
                delay,
                max_backoff: Duration::from_millis(config.max_backoff_ms),
                max_retries: config.max_retries,
            },
        }
    }
}

impl PacingPolicy {
    /// Pause inserted after every attempt, whatever its outcome.
    pub fn delay(&self) -> Duration {
        match self {
            PacingPolicy::Fixed { delay } | PacingPolicy::Adaptive { delay, .. } => *delay,
        }
    }

    /// Wait before retry number `retry` (starting at 1) of a failed call, or
    /// `None` when the call must be reported as failed instead.
    pub fn backoff(&self, retry: u32, error: &ApiError) -> Option<Duration> {
        let PacingPolicy::Adaptive {
            delay,
            max_backoff,
            max_retries,
        } = self
        else {
            return None;
        };
        let ApiError::RateLimited { retry_after } = error else {
            return None;
        };
        if retry == 0 || retry > *max_retries {
            return None;
        }

        match *retry_after {
            Some(wait) if wait > *max_backoff => {
                tracing::warn!(
                    "Service asked to wait {wait:?}, waiting {max_backoff:?} instead"
                );
                Some(*max_backoff)
            }
            Some(wait) => Some(wait),
            None => Some(
                delay
                    .saturating_mul(2u32.saturating_pow(retry - 1))
                    .min(*max_backoff),
            ),
        }
    }
}
