//! Restart command implementation
//!
//! Implements the `crib restart` subcommand: classifies the delta between
//! the configuration used for the last successful `up` and the configuration
//! on disk now, and picks the cheapest operation that is still correct —
//! a plain container restart, a recreate without rebuilding the image, or a
//! full rebuild.

use crate::commands::up::{execute_up, UpArgs, UpContainerInfo};
use anyhow::{anyhow, Result};
use crib_core::change_detection::{detect_change, ChangeKind};
use crib_core::config::{ConfigLoader, DevContainerConfig, DiscoveryResult};
use crib_core::container::ContainerIdentity;
use crib_core::docker::CliDocker;
use crib_core::workspace_store::WorkspaceStore;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct RestartArgs {
    pub workspace_folder: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

#[instrument(skip(args))]
pub async fn execute_restart(args: RestartArgs) -> Result<UpContainerInfo> {
    let workspace_folder = args.workspace_folder.clone().unwrap_or_else(|| PathBuf::from("."));

    let current_config = load_config(&workspace_folder, args.config_path.as_deref())?;
    let identity = ContainerIdentity::new(&workspace_folder, &current_config);

    let store = WorkspaceStore::open_default()?;
    let previous_result = store.load_result(&identity.workspace_hash)?.ok_or_else(|| {
        anyhow!(
            "workspace '{}' has never been brought up; run `crib up` first",
            identity.workspace_hash
        )
    })?;

    let previous_config: DevContainerConfig =
        serde_json::from_value(previous_result.merged_config.clone()).unwrap_or_default();

    let change = detect_change(&previous_config, &current_config);
    debug!("Detected change kind: {:?}", change);

    match change {
        ChangeKind::None => {
            info!("No relevant configuration change; restarting container in place");
            let docker = CliDocker::new();
            docker
                .restart_container(&previous_result.container_id, Some(30))
                .await?;
            Ok(UpContainerInfo {
                container_id: previous_result.container_id,
                remote_user: previous_result.remote_user.unwrap_or_default(),
                remote_workspace_folder: previous_result.workspace_folder,
                compose_project_name: None,
                effective_mounts: None,
                effective_env: None,
                profiles_applied: None,
                external_volumes_preserved: None,
                configuration: None,
                merged_configuration: Some(previous_result.merged_config),
            })
        }
        ChangeKind::Safe => {
            info!("Safe configuration change; recreating container without rebuilding image");
            execute_up(UpArgs {
                workspace_folder: args.workspace_folder,
                config_path: args.config_path,
                remove_existing_container: true,
                ..UpArgs::default()
            })
            .await
        }
        ChangeKind::NeedsRebuild => Err(anyhow!(
            "configuration change requires a rebuild; run `crib rebuild`"
        )),
    }
}

fn load_config(workspace_folder: &Path, config_path: Option<&Path>) -> Result<DevContainerConfig> {
    if let Some(config_path) = config_path {
        return Ok(ConfigLoader::load_from_path(config_path)?);
    }
    match ConfigLoader::discover_config(workspace_folder)? {
        DiscoveryResult::Single(path) => Ok(ConfigLoader::load_from_path(&path)?),
        DiscoveryResult::Multiple(_) => Err(anyhow!(
            "multiple devcontainer configs found under {:?}; specify --config",
            workspace_folder
        )),
        DiscoveryResult::None(_) => Err(anyhow!(
            "no devcontainer config found under {:?}",
            workspace_folder
        )),
    }
}
