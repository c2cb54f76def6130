//! Errors raised while building or applying the gridding operators.
//!
//! All of these are configuration or programming errors: nothing in here is
//! transient, so nothing is worth retrying.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    /// A tensor handed to an operator does not have the declared shape
    #[error("{op}: {which} shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        op: String,
        which: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown kernel `{0}`: expected NN, KB3, KB5, KB7, ES3, ES5 or ES7")]
    UnknownKernel(String),

    #[error("Invalid trajectory: {0}")]
    Trajectory(String),

    #[error("Invalid basis: {0}")]
    Basis(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, GridError>;

impl GridError {
    pub fn config(msg: impl Into<String>) -> Self { Self::InvalidConfiguration(msg.into()) }
    pub fn trajectory(msg: impl Into<String>) -> Self { Self::Trajectory(msg.into()) }
    pub fn basis(msg: impl Into<String>) -> Self { Self::Basis(msg.into()) }
}

/// Fail unless `actual` is exactly `expected`. Never reshape silently.
pub fn check_shape(op: &str, which: &'static str, expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected == actual { return Ok(()) }
    Err(GridError::ShapeMismatch {
        op: op.to_string(),
        which,
        expected: expected.to_vec(),
        actual: actual.to_vec(),
    })
}
