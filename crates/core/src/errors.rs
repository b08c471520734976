//! Error types and handling
//!
//! This module provides domain-specific error types following the CLI specification.

use thiserror::Error;

/// Domain errors for the DevContainer CLI
#[derive(Error, Debug)]
pub enum CribError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigurationNotFound { path: String },

    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    ConfigurationParse { message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file: {source}")]
    ConfigurationIo {
        #[from]
        source: std::io::Error,
    },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    ConfigurationValidation { message: String },

    /// Feature not implemented
    #[error("Feature not implemented: {feature}")]
    NotImplemented { feature: String },

    /// Docker/Runtime-related errors
    #[error(transparent)]
    Docker(#[from] DockerError),

    /// Feature-related errors
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// Template-related errors
    #[error("Template error: {message}")]
    Template { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Authentication errors
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Runtime selection/detection errors (unknown `--runtime` value, etc).
    #[error("{0}")]
    Runtime(String),

    /// Configuration discovery/parsing/validation errors, grouped under
    /// [`ConfigError`] rather than flattened into this enum's own variants.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from devcontainer.json discovery, parsing, and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {path}")]
    NotFound { path: String },

    #[error("multiple devcontainer configurations found: {}", paths.join(", "))]
    MultipleConfigs { paths: Vec<String> },

    #[error("{message}")]
    Parsing { message: String },

    #[error("{message}")]
    Validation { message: String },

    #[error("extends cycle detected: {chain}")]
    ExtendsCycle { chain: String },

    #[error("not implemented: {feature}")]
    NotImplemented { feature: String },

    #[error("configuration I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the Docker/Podman CLI driver.
#[derive(Error, Debug)]
pub enum DockerError {
    #[error("docker is not installed or not available on PATH")]
    NotInstalled,

    #[error("{0}")]
    CLIError(String),

    #[error("container not found: {id}")]
    ContainerNotFound { id: String },

    #[error("command exited with non-zero status: {code}")]
    ExecFailed { code: i32 },

    #[error("failed to allocate a TTY: {reason}")]
    TTYFailed { reason: String },
}

/// Errors from Feature discovery, resolution, and installation.
#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("failed to download feature: {message}")]
    Download { message: String },

    #[error("OCI registry error: {message}")]
    Oci { message: String },

    #[error("authentication error: {message}")]
    Authentication { message: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("forbidden: {message}")]
    Forbidden { message: String },

    #[error("{message}")]
    Parsing { message: String },

    #[error("{message}")]
    Validation { message: String },

    #[error("failed to extract feature archive: {message}")]
    Extraction { message: String },

    #[error("{message}")]
    Installation { message: String },

    #[error("feature '{feature_id}' failed to install: {message}")]
    InstallationFailed {
        feature_id: String,
        message: String,
    },

    #[error("feature not found: {path}")]
    NotFound { path: String },

    #[error("dependency cycle detected: {chain}")]
    DependencyCycle { chain: String },

    #[error("invalid dependency for feature '{feature_id}': {message}")]
    InvalidDependency {
        feature_id: String,
        message: String,
    },

    #[error("failed to resolve feature dependencies: {message}")]
    DependencyResolution { message: String },

    #[error("feature I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("feature JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not implemented")]
    NotImplemented,
}

/// Convenience type alias for Results with CribError
pub type Result<T> = std::result::Result<T, CribError>;
