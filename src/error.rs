//! Error types for Plantar Flux

use std::io;
use thiserror::Error;

/// Classification of a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The operation may succeed if retried on the same link
    Transient,
    /// The link is unusable and must be closed
    Fatal,
}

impl FaultKind {
    /// Classify an I/O error raised by a stream operation
    pub fn classify(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                FaultKind::Transient
            }
            _ => FaultKind::Fatal,
        }
    }
}

/// Errors that can occur while sampling, transporting or reconstructing
#[derive(Debug, Error)]
pub enum PlantarError {
    #[error("Device bus error: {0}")]
    Device(String),

    #[error("Transport fault ({kind:?}): {source}")]
    Transport {
        kind: FaultKind,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid foot layout: {0}")]
    InvalidLayout(String),

    #[error("Invalid foot outline: {0}")]
    InvalidOutline(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PlantarError {
    /// Wrap a stream error with its fault classification
    pub fn transport(source: io::Error) -> Self {
        PlantarError::Transport {
            kind: FaultKind::classify(&source),
            source,
        }
    }

    /// Whether retrying on the same link could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlantarError::Transport {
                kind: FaultKind::Transient,
                ..
            }
        )
    }
}
