//! Error type shared by every module of the crate.
//!
//! Only precondition violations (bad shapes, unsupported configuration
//! combinations) and I/O or parse failures while loading configuration are
//! errors. Numerical trouble inside the line search and failed line searches
//! are handled by the optimizer itself and never surface here.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors produced while building, evaluating or training a network.
#[derive(Debug, Error)]
pub enum NetError {
    /// A network needs at least one layer.
    #[error("network must contain at least one layer")]
    EmptyNetwork,

    /// Consecutive layers do not chain (output of `index` vs input of `index + 1`).
    #[error("layer {index} produces {output} units but the next layer expects {input}")]
    LayerMismatch {
        index: usize,
        output: usize,
        input: usize,
    },

    /// Two sizes that must agree do not.
    #[error("shape mismatch for {what}: got {got}, expected {expected}")]
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },

    /// The loss cannot be used with the network's output activation.
    #[error("{loss} loss requires a {required} output layer, found {found}")]
    UnsupportedLoss {
        loss: &'static str,
        required: &'static str,
        found: &'static str,
    },

    /// A configuration value is out of range or unknown.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
