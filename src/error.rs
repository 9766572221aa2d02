use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong between reading the configuration and
/// persisting the prime list.
#[derive(Debug, Error)]
pub enum SieveError {
    #[error("invalid {parameter} `{value}`: {reason}")]
    InvalidConfiguration {
        parameter: &'static str,
        value: String,
        reason: String,
    },

    #[error("could not allocate a composite buffer of {requested} flags")]
    AllocationFailure { requested: usize },

    #[error("worker {worker} failed: {reason}")]
    WorkerFailed { worker: usize, reason: String },

    #[error("failed to write {}", .path.display())]
    OutputWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}", .path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} line {line} is not a prime: `{content}`", .path.display())]
    InvalidArtifact {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("entry {index} is {found}, expected {expected}")]
    VerificationFailed {
        index: usize,
        found: String,
        expected: String,
    },

    #[error("reference run found {reference} primes, concurrent run found {concurrent}")]
    CrossCheckMismatch { reference: usize, concurrent: usize },
}

impl SieveError {
    pub fn invalid(
        parameter: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        SieveError::InvalidConfiguration {
            parameter,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn write_failure(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SieveError::OutputWriteFailure {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SieveError>;
