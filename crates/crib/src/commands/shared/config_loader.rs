//! Shared configuration loading helpers for CLI commands.
//!
//! Centralizes workspace/config/override resolution and secrets handling so
//! all subcommands share the same error mapping and substitution behavior.

use crib_core::config::{ConfigLoader, DevContainerConfig, DiscoveryResult};
use crib_core::errors::{ConfigError, CribError, Result};
use crib_core::secrets::SecretsCollection;
use crib_core::variable::SubstitutionReport;
use std::path::{Path, PathBuf};

/// Inputs for configuration loading.
pub struct ConfigLoadArgs<'a> {
    /// Optional workspace folder (defaults to current directory)
    pub workspace_folder: Option<&'a Path>,
    /// Explicit config path (--config)
    pub config_path: Option<&'a Path>,
    /// Override config path (--override-config)
    pub override_config_path: Option<&'a Path>,
    /// Secrets file paths (--secrets-file)
    pub secrets_files: &'a [PathBuf],
}

/// Loaded configuration and supporting context.
#[derive(Debug)]
pub struct ConfigLoadResult {
    pub config: DevContainerConfig,
    #[allow(dead_code)]
    pub substitution_report: SubstitutionReport,
    pub workspace_folder: PathBuf,
    #[allow(dead_code)]
    pub config_path: PathBuf,
}

/// Resolve and load configuration using shared discovery rules.
///
/// Resolution order:
/// - Use `config_path` when provided.
/// - Otherwise discover under `workspace_folder` (or current dir) via `ConfigLoader::discover_config`.
/// - If the discovered path does not exist and an override is provided, treat the override as the base config.
///
/// Secrets from `secrets_files` are threaded into substitution. Errors are surfaced
/// as `CribError::Config` variants to preserve upstream JSON contracts.
pub fn load_config(args: ConfigLoadArgs<'_>) -> Result<ConfigLoadResult> {
    let workspace_folder = if let Some(folder) = args.workspace_folder {
        folder.to_path_buf()
    } else {
        std::env::current_dir().map_err(|e| CribError::Config(ConfigError::Io(e)))?
    };

    let mut config_path = if let Some(path) = args.config_path {
        // Validate filename per spec: must be devcontainer.json(c) or .devcontainer.json(c)
        // The .jsonc extension is allowed for JSON with comments
        if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
            let valid_names = [
                "devcontainer.json",
                "devcontainer.jsonc",
                ".devcontainer.json",
                ".devcontainer.jsonc",
            ];
            if !valid_names.contains(&file_name) {
                return Err(CribError::Config(ConfigError::Validation {
                    message: "Filename must be devcontainer.json(c) or .devcontainer.json(c)"
                        .to_string(),
                }));
            }
        }
        path.to_path_buf()
    } else {
        match ConfigLoader::discover_config(&workspace_folder)? {
            DiscoveryResult::Single(path) => path,
            DiscoveryResult::Multiple(paths) => {
                let display_paths: Vec<String> = paths
                    .iter()
                    .map(|p| {
                        p.strip_prefix(&workspace_folder)
                            .unwrap_or(p)
                            .to_string_lossy()
                            .to_string()
                    })
                    .collect();
                return Err(CribError::Config(ConfigError::MultipleConfigs {
                    paths: display_paths,
                }));
            }
            DiscoveryResult::None(default) => default,
        }
    };

    let mut override_config_path = args.override_config_path.map(|p| p.to_path_buf());

    // When the discovered/base config is missing, fall back to using the override as the base.
    if !config_path.exists() {
        if let Some(override_path) = override_config_path.take() {
            config_path = override_path;
        }
    }

    let secrets = if args.secrets_files.is_empty() {
        None
    } else {
        Some(SecretsCollection::load_from_files(args.secrets_files)?)
    };

    let (config, substitution_report) = ConfigLoader::load_with_overrides_and_substitution(
        &config_path,
        override_config_path.as_deref(),
        secrets.as_ref(),
        &workspace_folder,
    )?;

    Ok(ConfigLoadResult {
        config,
        substitution_report,
        workspace_folder,
        config_path,
    })
}
