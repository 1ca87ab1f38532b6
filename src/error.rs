use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::Mode;

/// Errors raised by the acquisition environment, the agent and the training loop.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Action {action} is outside the action space of size {n_actions}")]
    InvalidAction { action: usize, n_actions: usize },

    #[error("Action {0} was already taken in this episode")]
    MaskedAction(usize),

    #[error("Episode has already terminated")]
    EpisodeTerminated,

    #[error("A guess was already made in this episode")]
    GuessAlreadyMade,

    #[error("Instance index {index} out of range for {mode} partition of size {len}")]
    InstanceOutOfRange { mode: Mode, index: usize, len: usize },

    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to write checkpoint {path}: {source}")]
    CheckpointWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read checkpoint {path}: {source}")]
    CheckpointRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "nn")]
    #[error(transparent)]
    Tch(#[from] tch::TchError),
}

pub type Result<T> = std::result::Result<T, AcquisitionError>;
