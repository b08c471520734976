//! Rebuild command implementation
//!
//! Implements the `crib rebuild` subcommand: forces a fresh image build
//! (bypassing the prebuild-hash cache) and recreates the container.

use crate::commands::up::{execute_up, UpArgs, UpContainerInfo};
use anyhow::Result;
use std::path::PathBuf;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct RebuildArgs {
    pub workspace_folder: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

#[instrument(skip(args))]
pub async fn execute_rebuild(args: RebuildArgs) -> Result<UpContainerInfo> {
    let up_args = UpArgs {
        workspace_folder: args.workspace_folder,
        config_path: args.config_path,
        remove_existing_container: true,
        build_no_cache: true,
        ..UpArgs::default()
    };
    execute_up(up_args).await
}
