//! Errors raised on the host side of the expansion ABI.
//!
//! The ABI itself has no error channel; every variant here is something the
//! host detects on its own.

use std::path::PathBuf;

use thiserror::Error;

use crate::host::LifecycleState;

#[derive(Debug, Error)]
pub enum ExpansionError {
    #[error("Failed to load expansion library \"{}\"", .path.display())]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Expansion \"{}\" is missing required symbol \"{symbol}\"", .path.display())]
    SymbolNotPresent { path: PathBuf, symbol: String },

    #[error(
        "Expansion \"{name}\" reports API version {found}, supported versions are {expected:?}"
    )]
    ApiVersionMismatch {
        name: String,
        expected: Vec<usize>,
        found: usize,
    },

    #[error("Cannot {operation} expansion \"{name}\" while it is {state}")]
    InvalidState {
        name: String,
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("Dynamic loading support is not enabled. Compile with the 'dynamic-loading' feature.")]
    DynamicLoadingDisabled,
}

pub type Result<T> = std::result::Result<T, ExpansionError>;
