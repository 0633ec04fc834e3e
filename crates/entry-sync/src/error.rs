//! Error types for entry sync
//!
//! Provides error handling for:
//! - Transport failures of the backend calls
//! - Queue lifecycle violations
//! - Page submission failures
//! - Whole-submission failures surfaced to the form
//! - Configuration loading

use crate::coordinator::RoundSummary;
use crate::queue::QueueState;
use entry_model::FieldErrors;

/// Failure of a single network call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with a failure status
    #[error("server error ({status}): {message}")]
    Server {
        /// Status code
        status: u16,
        /// Body or reason
        message: String,
    },

    /// No answer in time
    #[error("request timed out")]
    Timeout,

    /// Answer could not be understood
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Check if a fresh submission could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Server { status, .. } => *status >= 500,
            Self::Malformed(_) => false,
        }
    }
}

/// Queue lifecycle violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// A round is already running for this form
    #[error("a submission round is already in progress")]
    RoundInProgress,

    /// Operation needs a running round
    #[error("no submission round running (state: {0:?})")]
    NotSubmitting(QueueState),

    /// Previous page has not been answered yet
    #[error("page {0} is still in flight")]
    PageInFlight(usize),

    /// No page is waiting for a response
    #[error("no page is in flight")]
    NoPageInFlight,

    /// State machine violation
    #[error("illegal queue transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: QueueState,
        /// Requested state
        to: QueueState,
    },
}

/// Failure while draining the queue
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Queue misuse
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Page transport failed; the rest of the round was abandoned
    #[error("page {page_index} failed: {source}")]
    Transport {
        /// Index of the failed page
        page_index: usize,
        /// Underlying failure
        #[source]
        source: TransportError,
    },
}

/// Failure of a whole submission
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    /// Parent save call failed; no figure request was sent
    #[error("entry could not be saved: {0}")]
    ParentSave(#[source] TransportError),

    /// Parent save was rejected by validation; no figure request was sent
    #[error("entry was rejected by the server")]
    ParentRejected(FieldErrors),

    /// A figure page failed; answered pages were still merged
    #[error("figure page {page_index} could not be sent: {source}")]
    PageTransport {
        /// Index of the failed page
        page_index: usize,
        /// Underlying failure
        #[source]
        source: TransportError,
        /// What the answered pages achieved
        partial: Box<RoundSummary>,
    },

    /// Queue misuse
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl SaveError {
    /// Check if resubmitting unchanged data could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ParentSave(e) | Self::PageTransport { source: e, .. } => e.is_retryable(),
            Self::ParentRejected(_) | Self::Queue(_) => false,
        }
    }

    /// Field errors to show on the parent, if any
    #[must_use]
    pub fn parent_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::ParentRejected(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for this config
    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered
    #[error("could not render config: {0}")]
    Render(#[from] toml::ser::Error),

    /// Values out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        let err = TransportError::Server {
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn transport_error_is_retryable() {
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Network("reset".into()).is_retryable());
        assert!(TransportError::Server {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!TransportError::Server {
            status: 400,
            message: String::new()
        }
        .is_retryable());
        assert!(!TransportError::Malformed("x".into()).is_retryable());
    }

    #[test]
    fn save_error_classification() {
        let rejected = SaveError::ParentRejected(FieldErrors::non_field("duplicate url"));
        assert!(!rejected.is_retryable());
        assert!(rejected.parent_errors().is_some());

        let transport = SaveError::ParentSave(TransportError::Timeout);
        assert!(transport.is_retryable());
        assert!(transport.parent_errors().is_none());

        let queue = SaveError::from(QueueError::RoundInProgress);
        assert!(!queue.is_retryable());
    }
}
