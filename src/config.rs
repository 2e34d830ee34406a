//! Configuration structures for training
//!
//! [`TrainingConfig`] collects the knobs of a training run and can be read
//! from a JSON file. Every field is optional in the file and falls back to
//! its default.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::backprop::Loss;
use crate::error::{NetError, Result};
use crate::training::ErrorKind;

/// Settings of a training run.
///
/// # Example
///
/// ```json
/// {
///   "max_iterations": 50,
///   "error_kind": "reconstruction",
///   "loss": "lin_squared_err",
///   "batch_size": 128,
///   "line_searches": 3,
///   "seed": 42
/// }
/// ```
///
/// `loss` also accepts the names `"crossEntropy"` and `"linSquaredErr"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    /// Number of passes over the training data.
    pub max_iterations: usize,

    /// Metric used for the train/validation error reports.
    pub error_kind: ErrorKind,

    /// Loss minimized on every mini-batch.
    pub loss: Loss,

    /// Rows per mini-batch; the last batch of an epoch absorbs the remainder.
    pub batch_size: usize,

    /// Line searches the optimizer runs per mini-batch.
    pub line_searches: usize,

    /// Seed for shuffling; `None` seeds from the clock.
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            error_kind: ErrorKind::Classification,
            loss: Loss::LinSquaredErr,
            batch_size: 128,
            line_searches: 3,
            seed: None,
        }
    }
}

impl TrainingConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(NetError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.line_searches == 0 {
            return Err(NetError::InvalidConfig(
                "line_searches must be at least 1".to_string(),
            ));
        }
        if i64::try_from(self.line_searches).is_err() {
            return Err(NetError::InvalidConfig(format!(
                "line_searches {} is too large",
                self.line_searches
            )));
        }
        Ok(())
    }
}

/// Loads a training configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it and validates the result.
///
/// # Examples
///
/// ```no_run
/// use cg_backprop::config::load_config;
///
/// let cfg = load_config("config/xor.json").unwrap();
/// assert!(cfg.batch_size > 0);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
