//! # Pipeline Errors
//!
//! Every failure a run can hit. All of them are terminal for the current run:
//! nothing is retried here, the next scheduled trigger is the retry.

use std::path::PathBuf;
use std::time::Duration;

/// Convenience alias used by every pipeline step.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Connection failure, non-success status or empty body.
    #[error("{operation} failed for {target}: {message}")]
    Transport {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// A single request or the whole run exceeded its time allowance.
    #[error("{operation} timed out after {}s", .after.as_secs())]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },

    /// The metadata payload is missing fields or is not the expected shape.
    #[error("unexpected response from {target}: {message}")]
    Parse { target: String, message: String },

    /// Neither the resolution-specific asset nor the fallback exists.
    #[error("no image asset available (probed {primary} and {fallback})")]
    AssetNotFound { primary: String, fallback: String },

    /// The downloaded body could not be decoded as an image.
    #[error("content from {target} is not a valid image: {message}")]
    InvalidImage { target: String, message: String },

    /// Re-encoding or metadata splicing failed.
    #[error("could not encode image: {0}")]
    Encoding(String),

    /// Filesystem failure while storing the image.
    #[error("could not write {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The desktop personalization store cannot be opened or written.
    #[error("desktop settings ({store}) unavailable: {message}")]
    Configuration { store: &'static str, message: String },
}

impl PipelineError {
    pub fn transport(operation: &'static str, target: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            operation,
            target: target.into(),
            message: err.to_string(),
        }
    }

    pub fn configuration(store: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Configuration {
            store,
            message: err.to_string(),
        }
    }

    /// Maps a reqwest error into `TimedOut` or `Transport`.
    ///
    /// Timeouts are kept distinct so the caller can report "timed out"
    /// rather than a generic network error.
    pub fn from_reqwest(operation: &'static str, target: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TimedOut {
                operation,
                after: timeout,
            }
        } else {
            Self::transport(operation, target, err)
        }
    }

    /// Short, user-facing description without transport internals.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "Could not reach Bing - check your internet connection.",
            Self::TimedOut { .. } => "Updating the background timed out.",
            Self::Parse { .. } => "Bing returned an unexpected response.",
            Self::AssetNotFound { .. } => "Today's image is not available yet.",
            Self::InvalidImage { .. } => "The downloaded file was not an image.",
            Self::Encoding(_) | Self::Storage { .. } => "The image could not be saved.",
            Self::Configuration { .. } => "The desktop background settings could not be changed.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_operation_and_target() {
        let err = PipelineError::transport("metadata fetch", "https://example.test/api", "connection refused");
        let msg = err.to_string();
        assert!(msg.contains("metadata fetch"));
        assert!(msg.contains("https://example.test/api"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn timed_out_reports_seconds() {
        let err = PipelineError::TimedOut {
            operation: "background update",
            after: Duration::from_secs(45),
        };
        assert_eq!(err.to_string(), "background update timed out after 45s");
        assert_eq!(err.summary(), "Updating the background timed out.");
    }
}
