//! Remove command implementation
//!
//! Implements the `crib remove` subcommand (aliases `rm`, `delete`). Stops
//! and deletes the container (or compose project), clears lifecycle hook
//! markers, and deletes the workspace record entirely. A later `status` on
//! the same folder is therefore expected to error.

use crate::commands::down::{execute_down, DownArgs};
use anyhow::Result;
use crib_core::config::{ConfigLoader, DevContainerConfig, DiscoveryResult};
use crib_core::container::ContainerIdentity;
use crib_core::state::clear_phase_markers;
use crib_core::workspace_store::WorkspaceStore;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct RemoveArgs {
    pub workspace_folder: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub force: bool,
    pub docker_path: String,
    pub docker_compose_path: String,
}

#[instrument(skip(args))]
pub async fn execute_remove(args: RemoveArgs) -> Result<()> {
    let workspace_folder = args.workspace_folder.clone().unwrap_or_else(|| PathBuf::from("."));

    debug!("Removing workspace at {:?}", workspace_folder);

    execute_down(DownArgs {
        remove: true,
        all: false,
        volumes: true,
        force: args.force,
        timeout: Some(30),
        workspace_folder: Some(workspace_folder.clone()),
        config_path: args.config_path.clone(),
        docker_path: args.docker_path.clone(),
        docker_compose_path: args.docker_compose_path.clone(),
    })
    .await?;

    clear_phase_markers(&workspace_folder)?;

    let config = load_config(&workspace_folder, args.config_path.as_deref())
        .unwrap_or_else(|_| DevContainerConfig::default());
    let identity = ContainerIdentity::new(&workspace_folder, &config);

    let store = WorkspaceStore::open_default()?;
    store.delete_workspace(&identity.workspace_hash)?;

    info!("Removed workspace {}", identity.workspace_hash);
    Ok(())
}

fn load_config(workspace_folder: &Path, config_path: Option<&Path>) -> Result<DevContainerConfig> {
    if let Some(config_path) = config_path {
        return Ok(ConfigLoader::load_from_path(config_path)?);
    }
    match ConfigLoader::discover_config(workspace_folder)? {
        DiscoveryResult::Single(path) => Ok(ConfigLoader::load_from_path(&path)?),
        _ => Ok(DevContainerConfig::default()),
    }
}
