//! Error types for the background service.

use thiserror::Error;

use poise_compiler::CompileError;
use poise_core::PolicyError;

/// Persisted key-value store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("stored value under {key:?} is malformed: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Host rule engine rejections.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleEngineError {
    #[error("rule id {0} already installed")]
    DuplicateId(u32),

    #[error("rule {id} rejected: {reason}")]
    Rejected { id: u32, reason: String },

    #[error("rule engine unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    RuleEngine(#[from] RuleEngineError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("secure random source failed: {0}")]
    Entropy(getrandom::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
