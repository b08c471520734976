//! Command implementations
//!
//! This module contains implementations for all CLI subcommands.

#[cfg(feature = "full")]
pub mod build;
#[cfg(feature = "full")]
pub mod config;
pub mod down;
pub mod exec;
#[cfg(feature = "full")]
pub mod features;
#[cfg(feature = "full")]
pub mod features_monolith;
#[cfg(feature = "full")]
pub mod features_publish_output;
pub mod list;
#[cfg(feature = "full")]
pub mod outdated;
pub mod read_configuration;
pub mod rebuild;
pub mod remove;
pub mod restart;
#[cfg(feature = "full")]
pub mod run_user_commands;
pub mod shared;
pub mod shell;
pub mod status;
#[cfg(feature = "full")]
pub mod templates;
pub mod up;

/// Re-export the UpResult type to preserve the stdout JSON contract for the up command.
pub use up::UpResult;
