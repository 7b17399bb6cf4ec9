//! Error types for cubby configuration.

use thiserror::Error;

/// Errors that can occur while loading a [`StoreConfig`](crate::StoreConfig).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The tick interval variable was not a whole number of milliseconds
    #[error("invalid tick interval {value:?} in {var}: expected milliseconds")]
    InvalidInterval { var: &'static str, value: String },

    /// The tick interval variable was zero
    #[error("tick interval in {var} must be greater than zero")]
    ZeroInterval { var: &'static str },
}
