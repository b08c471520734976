//! Terminal sizing helpers shared across commands.

use anyhow::Result;
use crib_core::errors::{ConfigError, CribError};

/// Terminal dimensions for output formatting and PTY sizing.
///
/// Both columns and rows must be specified together when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalDimensions {
    pub columns: u32,
    pub rows: u32,
}

impl TerminalDimensions {
    /// Create terminal dimensions from optional CLI inputs.
    ///
    /// Returns `Ok(None)` when both values are omitted. Errors if only one
    /// dimension is provided or if either dimension is zero.
    pub fn new(columns: Option<u32>, rows: Option<u32>) -> Result<Option<Self>> {
        match (columns, rows) {
            (Some(cols), Some(rows)) => {
                if cols == 0 || rows == 0 {
                    return Err(CribError::Config(ConfigError::Validation {
                        message: "terminalColumns and terminalRows must be positive integers"
                            .to_string(),
                    })
                    .into());
                }

                Ok(Some(Self {
                    columns: cols,
                    rows,
                }))
            }
            (None, None) => Ok(None),
            (Some(_), None) => Err(CribError::Config(ConfigError::Validation {
                message: "--terminal-columns and --terminal-rows must both be provided".to_string(),
            })
            .into()),
            (None, Some(_)) => Err(CribError::Config(ConfigError::Validation {
                message: "--terminal-columns and --terminal-rows must both be provided".to_string(),
            })
            .into()),
        }
    }
}
