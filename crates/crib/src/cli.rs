//! Command-line surface for `crib`.
//!
//! Parses arguments and dispatches to the command implementations in
//! [`crate::commands`]. Global options (`--workspace-folder`, `--config`)
//! are accepted before the subcommand and forwarded to whichever command
//! needs them.

use crate::commands::list::{execute_list, render_list, ListArgs};
use crate::commands::rebuild::{execute_rebuild, RebuildArgs};
use crate::commands::remove::{execute_remove, RemoveArgs};
use crate::commands::restart::{execute_restart, RestartArgs};
use crate::commands::shell::{execute_shell, ShellArgs};
use crate::commands::status::{execute_status, render_status, StatusArgs};
use crate::commands::up::{execute_up, UpArgs, UpContainerInfo};
use crate::commands::{
    down::{execute_down, DownArgs},
    exec::{execute_exec, ExecArgs},
};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// BuildKit usage policy for image builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BuildKitOption {
    /// Use BuildKit when available, fall back to classic build otherwise.
    Auto,
    /// Never use BuildKit, even if available.
    Never,
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Manage developer containers declared by devcontainer.json"
)]
pub struct Cli {
    /// Path to the project directory (defaults to the current directory).
    #[arg(long, global = true)]
    pub workspace_folder: Option<PathBuf>,

    /// Explicit path to a devcontainer.json, overriding discovery.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create and start the workspace's container (or compose services).
    Up {
        /// Force-remove and recreate any existing container first.
        #[arg(long)]
        recreate: bool,
        /// Build the image without using the Docker layer cache.
        #[arg(long)]
        no_cache: bool,
    },
    /// Stop the workspace's container (or compose project).
    #[command(alias = "stop")]
    Down {
        /// Remove the container after stopping it.
        #[arg(long)]
        remove: bool,
        /// Act on every container matching this workspace's label, not just the tracked one.
        #[arg(long)]
        all: bool,
        /// Also remove anonymous volumes.
        #[arg(long)]
        volumes: bool,
        /// Force-stop and ignore the configured shutdown action.
        #[arg(long)]
        force: bool,
    },
    /// Stop, delete the container, and forget the workspace entirely.
    #[command(aliases = ["rm", "delete"])]
    Remove {
        #[arg(long)]
        force: bool,
    },
    /// Report whether the workspace's container is running, stopped, or absent.
    #[command(alias = "ps")]
    Status {
        #[arg(long)]
        json: bool,
    },
    /// List every workspace ever brought up on this host.
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        json: bool,
    },
    /// Run a command inside the workspace's container.
    Exec {
        /// Run as this user instead of the configured remote user.
        #[arg(long)]
        user: Option<String>,
        /// Don't allocate a TTY.
        #[arg(long)]
        no_tty: bool,
        /// Extra KEY=VALUE environment variables.
        #[arg(long = "env")]
        env: Vec<String>,
        /// Working directory inside the container.
        #[arg(long)]
        workdir: Option<String>,
        /// The command and its arguments.
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Open an interactive shell in the workspace's container.
    #[command(alias = "sh")]
    Shell {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        no_tty: bool,
        #[arg(long)]
        workdir: Option<String>,
        /// Rejected: use `exec -- <cmd>` to run a specific command.
        #[arg(trailing_var_arg = true)]
        extra_args: Vec<String>,
    },
    /// Force a fresh image build and recreate the container.
    Rebuild,
    /// Recreate or restart the container, rebuilding only if required.
    Restart,
    /// Print the CLI version.
    Version,
}

impl Cli {
    pub async fn dispatch(self) -> Result<()> {
        let workspace_folder = self.workspace_folder;
        let config_path = self.config;

        match self.command {
            Command::Up { recreate, no_cache } => {
                let args = UpArgs {
                    workspace_folder,
                    config_path,
                    remove_existing_container: recreate,
                    build_no_cache: no_cache,
                    ..UpArgs::default()
                };
                let info = execute_up(args).await?;
                print_up_result(&info);
            }
            Command::Down {
                remove,
                all,
                volumes,
                force,
            } => {
                execute_down(DownArgs {
                    remove,
                    all,
                    volumes,
                    force,
                    timeout: Some(30),
                    workspace_folder,
                    config_path,
                    docker_path: "docker".to_string(),
                    docker_compose_path: "docker-compose".to_string(),
                })
                .await?;
            }
            Command::Remove { force } => {
                execute_remove(RemoveArgs {
                    workspace_folder,
                    config_path,
                    force,
                    docker_path: "docker".to_string(),
                    docker_compose_path: "docker-compose".to_string(),
                })
                .await?;
            }
            Command::Status { json } => {
                let report = execute_status(StatusArgs {
                    workspace_folder,
                    config_path,
                    json,
                })
                .await?;
                println!("{}", render_status(&report, json));
            }
            Command::List { json } => {
                let entries = execute_list(&ListArgs { json }).await?;
                println!("{}", render_list(&entries, json));
            }
            Command::Exec {
                user,
                no_tty,
                env,
                workdir,
                command,
            } => {
                execute_exec(ExecArgs {
                    user,
                    no_tty,
                    env,
                    workdir,
                    id_label: Vec::new(),
                    command,
                    workspace_folder,
                    config_path,
                })
                .await?;
            }
            Command::Shell {
                user,
                no_tty,
                workdir,
                extra_args,
            } => {
                execute_shell(ShellArgs {
                    user,
                    no_tty,
                    workdir,
                    id_label: Vec::new(),
                    workspace_folder,
                    config_path,
                    extra_args,
                })
                .await?;
            }
            Command::Rebuild => {
                let info = execute_rebuild(RebuildArgs {
                    workspace_folder,
                    config_path,
                })
                .await?;
                print_up_result(&info);
            }
            Command::Restart => {
                let info = execute_restart(RestartArgs {
                    workspace_folder,
                    config_path,
                })
                .await?;
                print_up_result(&info);
            }
            Command::Version => {
                println!("{}", env!("CARGO_PKG_VERSION"));
            }
        }

        Ok(())
    }
}

/// Emit the `up`-family JSON contract: exactly one JSON document on stdout.
fn print_up_result(info: &UpContainerInfo) {
    let mut result = crate::commands::up::UpResult::success(
        info.container_id.clone(),
        info.remote_user.clone(),
        info.remote_workspace_folder.clone(),
    );
    if let Some(project_name) = info.compose_project_name.clone() {
        result = result.with_compose_project_name(project_name);
    }
    if let Some(configuration) = info.configuration.clone() {
        result = result.with_configuration(configuration);
    }
    if let Some(merged_configuration) = info.merged_configuration.clone() {
        result = result.with_merged_configuration(merged_configuration);
    }
    println!(
        "{}",
        serde_json::to_string(&result).unwrap_or_else(|_| "{}".to_string())
    );
}
