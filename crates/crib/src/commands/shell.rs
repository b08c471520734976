//! Shell command implementation
//!
//! Implements the `crib shell` subcommand (alias `sh`): opens an interactive
//! shell in the workspace's container. Unlike `exec`, it takes no command —
//! positional arguments are rejected with a pointer to `exec`.

use crate::commands::exec::{execute_exec, ExecArgs};
use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct ShellArgs {
    pub user: Option<String>,
    pub no_tty: bool,
    pub workdir: Option<String>,
    pub id_label: Vec<String>,
    pub workspace_folder: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    /// Trailing positional args, present only so we can reject them with a
    /// helpful error instead of clap silently swallowing them.
    pub extra_args: Vec<String>,
}

const DEFAULT_SHELL: &str = "/bin/sh";

#[instrument(skip(args))]
pub async fn execute_shell(args: ShellArgs) -> Result<()> {
    if !args.extra_args.is_empty() {
        bail!(
            "`shell` does not accept a command (got: {}). Use `crib exec -- {}` instead.",
            args.extra_args.join(" "),
            args.extra_args.join(" ")
        );
    }

    execute_exec(ExecArgs {
        user: args.user,
        no_tty: args.no_tty,
        env: Vec::new(),
        workdir: args.workdir,
        id_label: args.id_label,
        command: vec![DEFAULT_SHELL.to_string()],
        workspace_folder: args.workspace_folder,
        config_path: args.config_path,
    })
    .await
}
