use std::future::Future;
use std::time::Duration;

use domain_backup::exception::{BackupException, BackupResult};
use domain_backup::model::vo::DeleteOutcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    /// Delay doubles after every attempt.
    Exponential,
}

/// Bounded retry of deletions the backend reports as busy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    #[serde(default = "RetryPolicy::default_retries")]
    pub retries: u32,
    #[serde(default = "RetryPolicy::default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default)]
    pub backoff: Backoff,
}

impl RetryPolicy {
    fn default_retries() -> u32 {
        3
    }

    fn default_delay_ms() -> u64 {
        5000
    }

    /// Policy without retries, busy is reported right away.
    pub fn none() -> Self {
        Self {
            retries: 0,
            delay_ms: 0,
            backoff: Backoff::Fixed,
        }
    }

    /// Delay before retry number `retry`, counted from 1.
    pub fn delay(&self, retry: u32) -> Duration {
        let delay = Duration::from_millis(self.delay_ms);
        match self.backoff {
            Backoff::Fixed => delay,
            Backoff::Exponential => {
                delay.saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
            }
        }
    }

    /// Run `remove` until it reports something other than busy or the
    /// retries are used up.
    pub async fn remove<F, Fut>(&self, name: &str, mut remove: F) -> BackupResult<DeleteOutcome>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<DeleteOutcome>> + Send,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match remove().await? {
                DeleteOutcome::Busy if attempts <= self.retries => {
                    let delay = self.delay(attempts);
                    tracing::warn!(
                        "{name} is busy, retrying in {delay:?} ({attempts}/{}).",
                        self.retries
                    );
                    tokio::time::sleep(delay).await;
                }
                DeleteOutcome::Busy => {
                    tracing::error!("{name} is still busy after {attempts} attempt(s), giving up.");
                    return Err(BackupException::Busy {
                        name: name.to_owned(),
                        attempts,
                    });
                }
                outcome => return Ok(outcome),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: Self::default_retries(),
            delay_ms: Self::default_delay_ms(),
            backoff: Backoff::default(),
        }
    }
}
