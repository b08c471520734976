use anyhow::Result;
use crib_core::errors::CribError;

/// Parsed and normalized remote environment variable from CLI input.
///
/// Validates env var entries provided via `--remote-env` / `--env`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRemoteEnv {
    pub name: String,
    pub value: String,
}

impl NormalizedRemoteEnv {
    /// Parse and validate a remote env string from CLI.
    ///
    /// Expected format: `NAME=value`
    ///
    /// Returns error if format is invalid (missing =).
    pub fn parse(env_str: &str) -> Result<Self> {
        let parts: Vec<&str> = env_str.splitn(2, '=').collect();

        if parts.len() != 2 {
            return Err(
                CribError::Config(crib_core::errors::ConfigError::Validation {
                    message: format!(
                        "Invalid remote-env format: '{}'. Expected: NAME=value",
                        env_str
                    ),
                })
                .into(),
            );
        }

        Ok(Self {
            name: parts[0].to_string(),
            value: parts[1].to_string(),
        })
    }
}
