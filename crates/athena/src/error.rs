//! Error types for the discovery and indexing pipeline

use crate::discovery::range::RangeError;
use std::io;
use thiserror::Error;

/// Pipeline error type
///
/// Network failures never appear here: probes and lookups degrade to
/// negative results and share-protocol failures stay inside the walk that
/// hit them.
#[derive(Error, Debug)]
pub enum AthenaError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Database error: {0}")]
    Database(#[from] athena_db::DbError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Phase panicked: {0}")]
    Panicked(String),
}

impl AthenaError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn scheduler(msg: impl Into<String>) -> Self {
        Self::Scheduler(msg.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AthenaError>;
