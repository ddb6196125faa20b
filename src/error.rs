//! Error types for the simulators and their front ends.
//!
//! A cache miss or a page fault is a normal outcome and never shows up here.

use std::process::ExitCode;
use thiserror::Error;

/// Result type alias for simulator operations
pub type Result<T> = std::result::Result<T, SimError>;

/// Rejected configuration; the instance is never created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),

    #[error("{what} capacity {got} exceeds the maximum of {max}")]
    CapacityTooLarge {
        what: &'static str,
        got: usize,
        max: usize,
    },

    #[error("unknown policy '{0}' (expected LRU, FIFO, RANDOM or CLOCK)")]
    UnknownPolicy(String),
}

/// Address or VPN text that could not be read at the boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty address")]
    Empty,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid number: {0}")]
    InvalidNumber(String),
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Access attempted before `configure`
    #[error("{0} not initialized, initialize the simulator first")]
    NotInitialized(&'static str),

    /// The address-space reader could not supply an entry
    #[error("page walk failed: {0}")]
    Walk(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    /// Get exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::from(2),
            Self::Parse(_) => ExitCode::from(3),
            Self::NotInitialized(_) => ExitCode::from(4),
            Self::Walk(_) => ExitCode::from(5),
            Self::Io(_) => ExitCode::from(7),
            Self::Json(_) => ExitCode::from(8),
        }
    }
}
