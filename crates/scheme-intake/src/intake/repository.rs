use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{ApplicationId, ApplicationStatus, NationalId};

/// Persisted application row. Only `status` changes after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application_id: ApplicationId,
    pub scheme_name: String,
    pub national_id: NationalId,
    pub applicant_name: String,
    pub phone: String,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.application_id.clone(),
            scheme_name: self.scheme_name.clone(),
            status: self.status.label().to_string(),
        }
    }
}

/// Storage abstraction for submitted applications.
pub trait ApplicationStore: Send + Sync {
    /// Atomically insert a new record; an existing id is a `Conflict`, never an overwrite.
    fn save(&self, record: ApplicationRecord) -> Result<SaveReceipt, RepositoryError>;
    fn status(&self, id: &ApplicationId) -> Result<ApplicationStatusView, RepositoryError>;
}

/// Acknowledgement returned once a record is durably written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReceipt {
    pub application_id: ApplicationId,
    pub status: &'static str,
}

/// Public status payload; applications are only reachable by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub scheme_name: String,
    /// Known labels are normalised; anything else the review process wrote is passed through.
    pub status: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("application not found")]
    NotFound,
    /// Lock contention or similar; safe to retry.
    #[error("store busy: {0}")]
    Busy(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Busy(_))
    }
}

/// Bounded exponential backoff for transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn none() -> Self {
        Self::new(0)
    }

    /// Run `operation`, retrying only errors that report themselves as transient.
    pub fn run<T, F>(&self, mut operation: F) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Result<T, RepositoryError>,
    {
        let mut attempt = 0u32;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self
                        .base_delay
                        .saturating_mul(2u32.saturating_pow(attempt - 1))
                        .min(self.max_delay);
                    warn!(attempt, ?delay, error = %err, "retrying store operation");
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(400),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quick(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn retries_busy_errors_until_success() {
        let calls = Cell::new(0);
        let result = quick(3).run(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(RepositoryError::Busy("database is locked".to_string()))
            } else {
                Ok(calls.get())
            }
        });

        assert_eq!(result.expect("eventually succeeds"), 3);
    }

    #[test]
    fn gives_up_after_bounded_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), _> = quick(2).run(|| {
            calls.set(calls.get() + 1);
            Err(RepositoryError::Busy("database is locked".to_string()))
        });

        assert!(matches!(result, Err(RepositoryError::Busy(_))));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn permanent_failures_surface_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), _> = quick(5).run(|| {
            calls.set(calls.get() + 1);
            Err(RepositoryError::Conflict)
        });

        assert!(matches!(result, Err(RepositoryError::Conflict)));
        assert_eq!(calls.get(), 1);
    }
}
