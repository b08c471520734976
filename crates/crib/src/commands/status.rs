//! Status command implementation
//!
//! Implements the `crib status` subcommand (alias `ps`) for reporting the
//! live state of the container or compose project belonging to a workspace.

use anyhow::Result;
use crib_core::config::{ConfigLoader, DevContainerConfig, DiscoveryResult};
use crib_core::container::ContainerIdentity;
use crib_core::docker::{CliDocker, Docker};
use crib_core::errors::{ConfigError, CribError};
use crib_core::workspace_store::WorkspaceStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct StatusArgs {
    pub workspace_folder: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub workspace_id: String,
    pub container_id: Option<String>,
    pub state: String,
    pub image: Option<String>,
}

/// Reports whether a workspace's container is running, stopped, or absent.
///
/// Errors when no workspace has ever been brought up here (`remove` deletes
/// the workspace record entirely, so `status` after `remove` is an error).
#[instrument(skip(args))]
pub async fn execute_status(args: StatusArgs) -> Result<StatusReport> {
    let workspace_folder = args.workspace_folder.as_deref().unwrap_or(Path::new("."));

    let config = load_config(workspace_folder, args.config_path.as_deref())?;
    let identity = ContainerIdentity::new(workspace_folder, &config);
    let workspace_id = identity.workspace_hash.clone();

    let store = WorkspaceStore::open_default()?;
    if !store.workspace_exists(&workspace_id) {
        return Err(CribError::Config(ConfigError::Validation {
            message: format!(
                "no workspace found for '{}' (has it ever been brought up?)",
                workspace_folder.display()
            ),
        })
        .into());
    }

    let result = store.load_result(&workspace_id)?;
    let docker = CliDocker::new();

    let (container_id, state, image) = match result {
        Some(result) => {
            let info = docker.inspect_container(&result.container_id).await?;
            match info {
                Some(info) => (Some(info.id), info.state, Some(result.image_name)),
                None => (Some(result.container_id), "absent".to_string(), None),
            }
        }
        None => (None, "never-started".to_string(), None),
    };

    debug!("Workspace {} state: {}", workspace_id, state);

    Ok(StatusReport {
        workspace_id,
        container_id,
        state,
        image,
    })
}

fn load_config(workspace_folder: &Path, config_path: Option<&Path>) -> Result<DevContainerConfig> {
    if let Some(config_path) = config_path {
        return Ok(ConfigLoader::load_from_path(config_path)?);
    }
    match ConfigLoader::discover_config(workspace_folder)? {
        DiscoveryResult::Single(path) => Ok(ConfigLoader::load_from_path(&path)?),
        DiscoveryResult::Multiple(paths) => {
            let display_paths: Vec<String> = paths
                .iter()
                .map(|p| {
                    p.strip_prefix(workspace_folder)
                        .unwrap_or(p)
                        .to_string_lossy()
                        .to_string()
                })
                .collect();
            Err(CribError::Config(ConfigError::MultipleConfigs {
                paths: display_paths,
            })
            .into())
        }
        DiscoveryResult::None(_) => Err(CribError::Config(ConfigError::Validation {
            message: format!("no devcontainer config found under {:?}", workspace_folder),
        })
        .into()),
    }
}

pub fn render_status(report: &StatusReport, json: bool) -> String {
    if json {
        serde_json::to_string_pretty(report).unwrap_or_default()
    } else {
        format!(
            "workspace: {}\nstate: {}\ncontainer: {}\nimage: {}",
            report.workspace_id,
            report.state,
            report.container_id.as_deref().unwrap_or("-"),
            report.image.as_deref().unwrap_or("-"),
        )
    }
}
