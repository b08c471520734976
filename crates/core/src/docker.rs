//! Docker and OCI container runtime integration
//!
//! This module handles Docker client abstraction, container lifecycle management,
//! image building, and container execution.

#[cfg(feature = "docker")]
use crate::config::DevContainerConfig;
#[cfg(feature = "docker")]
use crate::container::{ContainerIdentity, ContainerOps, ContainerResult};
#[cfg(feature = "docker")]
use crate::errors::{DockerError, Result};
#[cfg(feature = "docker")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "docker")]
use std::collections::HashMap;
#[cfg(feature = "docker")]
use std::path::Path;
#[cfg(feature = "docker")]
use std::process::Command;
#[cfg(feature = "docker")]
use tracing::{debug, instrument};

/// Container information returned by Docker operations
#[cfg(feature = "docker")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Container ID
    pub id: String,
    /// Container names
    pub names: Vec<String>,
    /// Container image
    pub image: String,
    /// Container status
    pub status: String,
    /// Container state
    pub state: String,
    /// Exposed ports from the container
    pub exposed_ports: Vec<ExposedPort>,
    /// Port mappings from host to container
    pub port_mappings: Vec<PortMapping>,
    /// Labels attached to the container
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Environment variables baked into the container at creation time
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Mount destinations inside the container
    #[serde(default)]
    pub mounts: Vec<String>,
}

/// Parse a Docker `key=value,key2=value2` label string into a map.
#[cfg(feature = "docker")]
fn parse_label_string(labels: &str) -> HashMap<String, String> {
    labels
        .split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Parse a Docker inspect `Config.Labels` JSON object into a map.
#[cfg(feature = "docker")]
fn parse_label_object(value: &serde_json::Value) -> HashMap<String, String> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a Docker inspect `Config.Env` JSON array of `KEY=VALUE` strings into a map.
#[cfg(feature = "docker")]
fn parse_env_array(value: &serde_json::Value) -> HashMap<String, String> {
    value
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| s.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a Docker inspect `Mounts` JSON array into a list of container destinations.
#[cfg(feature = "docker")]
fn parse_mount_destinations(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|m| m.get("Destination").and_then(|d| d.as_str()))
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Represents an exposed port from a container
#[cfg(feature = "docker")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposedPort {
    /// Port number
    pub port: u16,
    /// Protocol (tcp/udp)
    pub protocol: String,
}

/// Represents a port mapping from host to container
#[cfg(feature = "docker")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortMapping {
    /// Host port
    pub host_port: u16,
    /// Container port
    pub container_port: u16,
    /// Protocol (tcp/udp)
    pub protocol: String,
    /// Host IP
    pub host_ip: String,
}

/// Terminal dimensions passed through to `docker exec` sessions that need
/// to report a specific size (e.g. for `stty` inside the container).
#[cfg(feature = "docker")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub columns: u16,
    pub rows: u16,
}

/// Subset of `docker inspect <image>` output used to decide whether a
/// prebuilt image can be reused.
#[cfg(feature = "docker")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Image ID
    pub id: String,
    /// Repo tags the image is known under
    #[serde(default)]
    pub repo_tags: Vec<String>,
    /// Labels baked into the image
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Configuration for executing commands in containers
#[cfg(feature = "docker")]
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// User to run command as
    pub user: Option<String>,
    /// Working directory
    pub working_dir: Option<String>,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Whether to allocate a TTY
    pub tty: bool,
    /// Whether to attach stdin
    pub interactive: bool,
    /// Whether to detach the command
    pub detach: bool,
    /// Suppress output (used for internal probe commands)
    pub silent: bool,
    /// Explicit terminal size to report inside the container
    pub terminal_size: Option<TerminalSize>,
}

/// Result of executing a command in a container
#[cfg(feature = "docker")]
#[derive(Debug)]
pub struct ExecResult {
    /// Exit code of the command
    pub exit_code: i32,
    /// Whether the command completed successfully (exit code 0)
    pub success: bool,
}

/// Docker client abstraction trait
#[cfg(feature = "docker")]
#[allow(async_fn_in_trait)]
pub trait Docker {
    /// Health check for Docker daemon availability
    async fn ping(&self) -> Result<()>;

    /// List containers with optional label selector
    async fn list_containers(&self, label_selector: Option<&str>) -> Result<Vec<ContainerInfo>>;

    /// Inspect a specific container by ID
    async fn inspect_container(&self, id: &str) -> Result<Option<ContainerInfo>>;

    /// Inspect an image by reference (tag or ID); `None` if it doesn't exist locally.
    async fn inspect_image(&self, image_ref: &str) -> Result<Option<ImageInfo>>;

    /// Execute a command in a running container
    async fn exec(
        &self,
        container_id: &str,
        command: &[String],
        config: ExecConfig,
    ) -> Result<ExecResult>;

    /// Stop a running container, waiting up to `timeout` seconds before the kill signal.
    async fn stop_container(&self, container_id: &str, timeout: Option<u32>) -> Result<()>;
}

/// Docker client abstraction trait extended with container lifecycle operations
#[cfg(feature = "docker")]
#[allow(async_fn_in_trait)]
pub trait DockerLifecycle: Docker + ContainerOps {
    /// Execute the complete `up` workflow: find existing containers, reuse or create new
    #[allow(clippy::too_many_arguments)]
    async fn up(
        &self,
        identity: &ContainerIdentity,
        config: &DevContainerConfig,
        workspace_path: &Path,
        remove_existing: bool,
        gpu_mode: crate::gpu::GpuMode,
        merged_security: &crate::features::MergedSecurityOptions,
        merged_mounts: &crate::mount::MergedMounts,
        entrypoint_chain: &crate::features::EntrypointChain,
    ) -> Result<ContainerResult>;
}

/// CLI-based Docker implementation using docker command
#[cfg(feature = "docker")]
#[derive(Debug, Default, Clone)]
pub struct CliDocker {
    /// Docker CLI binary path
    docker_path: String,
}

/// Alias kept so feature-installation code can name the CLI driver without
/// committing to "Docker" when the underlying binary may be `podman`.
#[cfg(feature = "docker")]
pub type CliRuntime = CliDocker;

#[cfg(feature = "docker")]
impl CliDocker {
    /// Create a new CliDocker instance
    pub fn new() -> Self {
        Self {
            docker_path: "docker".to_string(),
        }
    }

    /// Create a new CliDocker instance pointed at the `docker` binary.
    pub fn docker() -> Self {
        Self::new()
    }

    /// Create a new CliDocker instance pointed at the `podman` binary.
    pub fn podman() -> Self {
        Self {
            docker_path: "podman".to_string(),
        }
    }

    /// Create a new CliDocker instance with custom docker binary path
    pub fn with_path(docker_path: String) -> Self {
        Self { docker_path }
    }

    /// Create a new CliDocker instance with a custom runtime binary path.
    pub fn with_runtime_path(runtime_path: String) -> Self {
        Self::with_path(runtime_path)
    }

    /// Probe the host for GPU capability using this instance's runtime binary.
    pub async fn detect_gpu_capability(&self) -> crate::gpu::HostGpuCapability {
        crate::gpu::detect_gpu_capability(&self.docker_path).await
    }

    /// Parse exposed ports from container Config.ExposedPorts
    fn parse_exposed_ports(config: &serde_json::Value) -> Vec<ExposedPort> {
        let mut exposed_ports = Vec::new();

        if let Some(exposed_ports_obj) = config
            .get("Config")
            .and_then(|c| c.get("ExposedPorts"))
            .and_then(|ep| ep.as_object())
        {
            for port_spec in exposed_ports_obj.keys() {
                if let Some((port_str, protocol)) = port_spec.split_once('/') {
                    if let Ok(port) = port_str.parse::<u16>() {
                        exposed_ports.push(ExposedPort {
                            port,
                            protocol: protocol.to_string(),
                        });
                    }
                }
            }
        }

        exposed_ports
    }

    /// Parse port mappings from container NetworkSettings.Ports
    fn parse_port_mappings(container: &serde_json::Value) -> Vec<PortMapping> {
        let mut port_mappings = Vec::new();

        if let Some(ports_obj) = container
            .get("NetworkSettings")
            .and_then(|ns| ns.get("Ports"))
            .and_then(|p| p.as_object())
        {
            for (port_spec, bindings) in ports_obj.iter() {
                if let Some((port_str, protocol)) = port_spec.split_once('/') {
                    if let Ok(container_port) = port_str.parse::<u16>() {
                        if let Some(bindings_array) = bindings.as_array() {
                            for binding in bindings_array {
                                if let (Some(host_port_str), Some(host_ip)) = (
                                    binding.get("HostPort").and_then(|hp| hp.as_str()),
                                    binding.get("HostIp").and_then(|hi| hi.as_str()),
                                ) {
                                    if let Ok(host_port) = host_port_str.parse::<u16>() {
                                        port_mappings.push(PortMapping {
                                            host_port,
                                            container_port,
                                            protocol: protocol.to_string(),
                                            host_ip: host_ip.to_string(),
                                        });
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        port_mappings
    }

    /// Check if docker binary is available
    #[instrument(skip(self))]
    pub fn check_docker_installed(&self) -> Result<()> {
        debug!(
            "Checking if Docker binary is installed at: {}",
            self.docker_path
        );

        let output = Command::new(&self.docker_path).arg("--version").output();

        match output {
            Ok(output) => {
                if output.status.success() {
                    debug!("Docker binary found and working");
                    Ok(())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(
                        DockerError::CLIError(format!("Docker version check failed: {}", stderr))
                            .into(),
                    )
                }
            }
            Err(e) => {
                debug!("Docker binary not found: {}", e);
                Err(DockerError::NotInstalled.into())
            }
        }
    }

    /// Execute docker command and return stdout
    #[instrument(skip(self))]
    #[allow(dead_code)] // Used by future features
    fn execute_docker(&self, args: &[&str]) -> Result<String> {
        debug!(
            "Executing docker command: {} {}",
            self.docker_path,
            args.join(" ")
        );

        let output = Command::new(&self.docker_path)
            .args(args)
            .output()
            .map_err(|e| {
                DockerError::CLIError(format!("Failed to execute docker command: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DockerError::CLIError(format!("Docker command failed: {}", stderr)).into());
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| DockerError::CLIError(format!("Invalid UTF-8 in docker output: {}", e)))?;

        Ok(stdout)
    }

    /// Parse docker ps JSON output into ContainerInfo
    #[allow(dead_code)] // Used by future features
    fn parse_container_list(&self, json_output: &str) -> Result<Vec<ContainerInfo>> {
        if json_output.trim().is_empty() {
            return Ok(Vec::new());
        }

        let containers: Vec<serde_json::Value> = json_output
            .trim()
            .lines()
            .map(serde_json::from_str)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                DockerError::CLIError(format!("Failed to parse container list JSON: {}", e))
            })?;

        let mut result = Vec::new();
        for container in containers {
            let container_info = ContainerInfo {
                id: container
                    .get("ID")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                names: container
                    .get("Names")
                    .and_then(|v| v.as_str())
                    .map(|s| s.split(',').map(|name| name.trim().to_string()).collect())
                    .unwrap_or_default(),
                image: container
                    .get("Image")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                status: container
                    .get("Status")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                state: container
                    .get("State")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                exposed_ports: vec![], // Not available in list format
                port_mappings: vec![], // Not available in list format
                labels: container
                    .get("Labels")
                    .and_then(|v| v.as_str())
                    .map(parse_label_string)
                    .unwrap_or_default(),
                env: HashMap::new(), // Not available in list format
                mounts: vec![],      // Not available in list format
            };
            result.push(container_info);
        }

        Ok(result)
    }

    /// Check if we're running in a TTY
    #[cfg(feature = "docker")]
    pub fn is_tty() -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }

    /// Parse environment variables from KEY=VALUE format
    #[allow(dead_code)] // Used by exec command
    fn parse_env_vars(env_vars: &[String]) -> Result<HashMap<String, String>> {
        let mut env_map = HashMap::new();
        for env_var in env_vars {
            if let Some((key, value)) = env_var.split_once('=') {
                env_map.insert(key.to_string(), value.to_string());
            } else {
                return Err(DockerError::CLIError(format!(
                    "Invalid environment variable format: '{}'. Expected KEY=VALUE",
                    env_var
                ))
                .into());
            }
        }
        Ok(env_map)
    }

    /// Parse docker inspect JSON output into ContainerInfo
    #[allow(dead_code)] // Used by future features
    fn parse_container_inspect(&self, json_output: &str) -> Result<Option<ContainerInfo>> {
        if json_output.trim().is_empty() {
            return Ok(None);
        }

        let containers: Vec<serde_json::Value> = serde_json::from_str(json_output)
            .map_err(|e| DockerError::CLIError(format!("Failed to parse inspect JSON: {}", e)))?;

        if containers.is_empty() {
            return Ok(None);
        }

        let container = &containers[0];
        let exposed_ports = Self::parse_exposed_ports(container);
        let port_mappings = Self::parse_port_mappings(container);

        let container_info = ContainerInfo {
            id: container
                .get("Id")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            names: container
                .get("Name")
                .and_then(|v| v.as_str())
                .map(|name| vec![name.trim_start_matches('/').to_string()])
                .unwrap_or_default(),
            image: container
                .get("Config")
                .and_then(|config| config.get("Image"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            status: container
                .get("State")
                .and_then(|state| state.get("Status"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            state: container
                .get("State")
                .and_then(|state| state.get("Status"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            exposed_ports,
            port_mappings,
            labels: container
                .get("Config")
                .and_then(|config| config.get("Labels"))
                .map(parse_label_object)
                .unwrap_or_default(),
            env: container
                .get("Config")
                .and_then(|config| config.get("Env"))
                .map(parse_env_array)
                .unwrap_or_default(),
            mounts: container
                .get("Mounts")
                .map(parse_mount_destinations)
                .unwrap_or_default(),
        };

        Ok(Some(container_info))
    }

    /// Stop a running container, waiting up to `timeout` seconds (default: Docker's own default).
    #[instrument(skip(self))]
    pub async fn stop_container(&self, container_id: &str, timeout: Option<u32>) -> Result<()> {
        debug!("Stopping container: {}", container_id);

        let docker_path = self.docker_path.clone();
        let container_id = container_id.to_string();

        tokio::task::spawn_blocking(move || -> std::result::Result<(), DockerError> {
            let mut command = Command::new(&docker_path);
            command.arg("stop");
            if let Some(timeout) = timeout {
                command.args(["-t", &timeout.to_string()]);
            }
            command.arg(&container_id);

            let output = command
                .output()
                .map_err(|e| DockerError::CLIError(format!("Failed to stop container: {}", e)))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(DockerError::CLIError(format!(
                    "Docker stop failed: {}",
                    stderr
                )));
            }

            Ok(())
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))?
        .map_err(Into::into)
    }

    /// Restart a container, waiting up to `timeout` seconds before the kill signal.
    #[instrument(skip(self))]
    pub async fn restart_container(&self, container_id: &str, timeout: Option<u32>) -> Result<()> {
        debug!("Restarting container: {}", container_id);

        let docker_path = self.docker_path.clone();
        let container_id = container_id.to_string();

        tokio::task::spawn_blocking(move || -> std::result::Result<(), DockerError> {
            let mut command = Command::new(&docker_path);
            command.arg("restart");
            if let Some(timeout) = timeout {
                command.args(["-t", &timeout.to_string()]);
            }
            command.arg(&container_id);

            let output = command.output().map_err(|e| {
                DockerError::CLIError(format!("Failed to restart container: {}", e))
            })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(DockerError::CLIError(format!(
                    "Docker restart failed: {}",
                    stderr
                )));
            }

            Ok(())
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))?
        .map_err(Into::into)
    }

    /// Remove a container along with its anonymous volumes (`docker rm -f -v`).
    #[instrument(skip(self))]
    pub async fn remove_container_with_volumes(&self, container_id: &str) -> Result<()> {
        debug!("Removing container with volumes: {}", container_id);

        let docker_path = self.docker_path.clone();
        let container_id = container_id.to_string();

        tokio::task::spawn_blocking(move || -> std::result::Result<(), DockerError> {
            let output = Command::new(&docker_path)
                .args(["rm", "-f", "-v", &container_id])
                .output()
                .map_err(|e| DockerError::CLIError(format!("Failed to remove container: {}", e)))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(DockerError::CLIError(format!(
                    "Docker rm failed: {}",
                    stderr
                )));
            }

            Ok(())
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))?
        .map_err(Into::into)
    }
}

#[cfg(feature = "docker")]
impl Docker for CliDocker {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<()> {
        debug!("Pinging Docker daemon");

        // Use blocking call as sync is acceptable per issue requirements
        tokio::task::spawn_blocking({
            let docker_path = self.docker_path.clone();
            move || {
                let output = Command::new(&docker_path)
                    .args(["version", "--format", "json"])
                    .output();

                match output {
                    Ok(output) => {
                        if output.status.success() {
                            debug!("Docker daemon is available");
                            Ok(())
                        } else {
                            let stderr = String::from_utf8_lossy(&output.stderr);
                            Err(
                                DockerError::CLIError(format!("Docker ping failed: {}", stderr))
                                    .into(),
                            )
                        }
                    }
                    Err(e) => {
                        debug!("Docker ping failed: {}", e);
                        Err(DockerError::NotInstalled.into())
                    }
                }
            }
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))?
    }

    #[instrument(skip(self))]
    async fn list_containers(&self, label_selector: Option<&str>) -> Result<Vec<ContainerInfo>> {
        debug!(
            "Listing containers with label selector: {:?}",
            label_selector
        );

    let docker_path = self.docker_path.clone();
    let label_selector = label_selector.map(|s| s.to_string());

        tokio::task::spawn_blocking(move || {
            let mut args: Vec<String> = vec!["ps", "--all", "--format", "json"]
                .into_iter()
                .map(|s| s.to_string())
                .collect();

            // Support multiple label filters; Docker expects one --filter per label
            if let Some(label) = &label_selector {
                for part in label.split(',') {
                    let trimmed = part.trim();
                    if !trimmed.is_empty() {
                        args.push("--filter".to_string());
                        // Each part is expected to be key or key=value
                        args.push(format!("label={}", trimmed));
                    }
                }
            }

            let output = Command::new(&docker_path)
                .args(&args)
                .output()
                .map_err(|e| DockerError::CLIError(format!("Failed to list containers: {}", e)))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(DockerError::CLIError(format!("Docker ps failed: {}", stderr)).into());
            }

            let stdout = String::from_utf8(output.stdout).map_err(|e| {
                DockerError::CLIError(format!("Invalid UTF-8 in docker output: {}", e))
            })?;

            // Parse the JSON output
            let mut containers = Vec::new();
            for line in stdout.trim().lines() {
                if line.trim().is_empty() {
                    continue;
                }

                let container: serde_json::Value = serde_json::from_str(line).map_err(|e| {
                    DockerError::CLIError(format!("Failed to parse container JSON: {}", e))
                })?;

                let container_info = ContainerInfo {
                    id: container
                        .get("ID")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    names: container
                        .get("Names")
                        .and_then(|v| v.as_str())
                        .map(|s| vec![s.to_string()])
                        .unwrap_or_default(),
                    image: container
                        .get("Image")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    status: container
                        .get("Status")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    state: container
                        .get("State")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                    exposed_ports: vec![], // Not available in list format
                    port_mappings: vec![], // Not available in list format
                    labels: container
                        .get("Labels")
                        .and_then(|v| v.as_str())
                        .map(parse_label_string)
                        .unwrap_or_default(),
                    env: HashMap::new(), // Not available in list format
                    mounts: vec![],      // Not available in list format
                };
                containers.push(container_info);
            }

            Ok(containers)
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))?
    }

    #[instrument(skip(self))]
    async fn inspect_container(&self, id: &str) -> Result<Option<ContainerInfo>> {
        debug!("Inspecting container: {}", id);

        let docker_path = self.docker_path.clone();
        let container_id = id.to_string();

        tokio::task::spawn_blocking(move || {
            let output = Command::new(&docker_path)
                .args(["inspect", &container_id])
                .output()
                .map_err(|e| {
                    DockerError::CLIError(format!("Failed to inspect container: {}", e))
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if stderr.contains("No such object") || stderr.contains("No such container") {
                    return Ok(None);
                }
                return Err(
                    DockerError::CLIError(format!("Docker inspect failed: {}", stderr)).into(),
                );
            }

            let stdout = String::from_utf8(output.stdout).map_err(|e| {
                DockerError::CLIError(format!("Invalid UTF-8 in docker output: {}", e))
            })?;

            let containers: Vec<serde_json::Value> =
                serde_json::from_str(&stdout).map_err(|e| {
                    DockerError::CLIError(format!("Failed to parse inspect JSON: {}", e))
                })?;

            if containers.is_empty() {
                return Ok(None);
            }

            let container = &containers[0];
            let exposed_ports = Self::parse_exposed_ports(container);
            let port_mappings = Self::parse_port_mappings(container);

            let container_info = ContainerInfo {
                id: container
                    .get("Id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                names: container
                    .get("Name")
                    .and_then(|v| v.as_str())
                    .map(|name| vec![name.trim_start_matches('/').to_string()])
                    .unwrap_or_default(),
                image: container
                    .get("Config")
                    .and_then(|config| config.get("Image"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                status: container
                    .get("State")
                    .and_then(|state| state.get("Status"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                state: container
                    .get("State")
                    .and_then(|state| state.get("Status"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                exposed_ports,
                port_mappings,
                labels: container
                    .get("Config")
                    .and_then(|config| config.get("Labels"))
                    .map(parse_label_object)
                    .unwrap_or_default(),
                env: container
                    .get("Config")
                    .and_then(|config| config.get("Env"))
                    .map(parse_env_array)
                    .unwrap_or_default(),
                mounts: container
                    .get("Mounts")
                    .map(parse_mount_destinations)
                    .unwrap_or_default(),
            };

            Ok(Some(container_info))
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))?
    }

    #[instrument(skip(self))]
    async fn inspect_image(&self, image_ref: &str) -> Result<Option<ImageInfo>> {
        debug!("Inspecting image: {}", image_ref);

        let docker_path = self.docker_path.clone();
        let image_ref = image_ref.to_string();

        tokio::task::spawn_blocking(move || {
            let output = Command::new(&docker_path)
                .args(["image", "inspect", &image_ref])
                .output()
                .map_err(|e| DockerError::CLIError(format!("Failed to inspect image: {}", e)))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if stderr.contains("No such image") {
                    return Ok(None);
                }
                return Err(
                    DockerError::CLIError(format!("Docker image inspect failed: {}", stderr))
                        .into(),
                );
            }

            let stdout = String::from_utf8(output.stdout).map_err(|e| {
                DockerError::CLIError(format!("Invalid UTF-8 in docker output: {}", e))
            })?;

            let images: Vec<serde_json::Value> = serde_json::from_str(&stdout).map_err(|e| {
                DockerError::CLIError(format!("Failed to parse image inspect JSON: {}", e))
            })?;

            let Some(image) = images.into_iter().next() else {
                return Ok(None);
            };

            let id = image
                .get("Id")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            let repo_tags = image
                .get("RepoTags")
                .and_then(|v| v.as_array())
                .map(|tags| {
                    tags.iter()
                        .filter_map(|t| t.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            let labels = image
                .get("Config")
                .and_then(|config| config.get("Labels"))
                .map(parse_label_object)
                .unwrap_or_default();

            Ok(Some(ImageInfo {
                id,
                repo_tags,
                labels,
            }))
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))?
    }

    #[instrument(skip(self))]
    async fn stop_container(&self, container_id: &str, timeout: Option<u32>) -> Result<()> {
        CliDocker::stop_container(self, container_id, timeout).await
    }

    #[instrument(skip(self))]
    async fn exec(
        &self,
        container_id: &str,
        command: &[String],
        config: ExecConfig,
    ) -> Result<ExecResult> {
        debug!("Executing command in container: {}", container_id);

        let docker_path = self.docker_path.clone();
        let container_id = container_id.to_string();
        let command = command.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut args = vec!["exec"];

            // Add TTY and interactive flags
            if config.tty {
                args.push("-t");
            }
            if config.interactive {
                args.push("-i");
            }

            // Add detach flag
            if config.detach {
                args.push("-d");
            }

            // Add user if specified
            if let Some(ref user) = config.user {
                args.push("-u");
                args.push(user);
            }

            // Add working directory if specified
            if let Some(ref workdir) = config.working_dir {
                args.push("-w");
                args.push(workdir);
            }

            // Add environment variables
            let mut env_args: Vec<String> = config
                .env
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            if let Some(size) = config.terminal_size {
                env_args.push(format!("COLUMNS={}", size.columns));
                env_args.push(format!("LINES={}", size.rows));
            }
            for env_arg in &env_args {
                args.push("-e");
                args.push(env_arg);
            }

            // Add signal proxy for TTY sessions
            if config.tty {
                args.push("--sig-proxy=true");
            }

            // Add container ID
            args.push(&container_id);

            // Add the command and arguments
            for cmd_part in &command {
                args.push(cmd_part);
            }

            if !config.silent {
                debug!("Docker exec args: {:?}", args);
            }

            let mut command_builder = std::process::Command::new(&docker_path);
            command_builder.args(&args);
            if config.silent {
                command_builder
                    .stdout(std::process::Stdio::null())
                    .stderr(std::process::Stdio::null());
            }

            let mut child = command_builder.spawn().map_err(|e| {
                DockerError::CLIError(format!("Failed to spawn docker exec: {}", e))
            })?;

            let exit_status = child.wait().map_err(|e| {
                DockerError::CLIError(format!("Failed to wait for docker exec: {}", e))
            })?;

            let exit_code = exit_status.code().unwrap_or(-1);
            let success = exit_status.success();

            Ok(ExecResult { exit_code, success })
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))?
    }
}

#[cfg(feature = "docker")]
impl ContainerOps for CliDocker {
    #[instrument(skip(self))]
    async fn find_matching_containers(&self, identity: &ContainerIdentity) -> Result<Vec<String>> {
        debug!("Finding containers with identity: {:?}", identity);

        let label_selector = identity.label_selector();
        let containers = self.list_containers(Some(&label_selector)).await?;

        let container_ids: Vec<String> = containers.into_iter().map(|c| c.id).collect();
        debug!("Found {} matching containers", container_ids.len());

        Ok(container_ids)
    }

    #[instrument(skip(self, config, merged_security, merged_mounts))]
    async fn create_container(
        &self,
        identity: &ContainerIdentity,
        config: &DevContainerConfig,
        workspace_path: &Path,
        gpu_mode: crate::gpu::GpuMode,
        merged_security: &crate::features::MergedSecurityOptions,
        merged_mounts: &crate::mount::MergedMounts,
    ) -> Result<String> {
        debug!("Creating container with identity: {:?}", identity);

        let container_name = identity.container_name();
        let labels = identity.labels();

        // Build docker run command
        let mut args = vec!["create".to_string()];

        // Add container name
        args.push("--name".to_string());
        args.push(container_name.clone());

        // Add labels
        for (key, value) in labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }

        // Add workspace mount (either from workspaceMount config or default)
        if let Some(ref workspace_mount) = config.workspace_mount {
            // Use custom workspace mount from config
            let mount = crate::mount::MountParser::parse_mount(workspace_mount)
                .map_err(|e| DockerError::CLIError(format!("Invalid workspaceMount: {}", e)))?;
            args.extend(mount.to_docker_args());
        } else {
            // Use default workspace mount
            let workspace_mount = format!(
                "type=bind,source={},target=/workspaces/{}",
                workspace_path.display(),
                workspace_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("workspace")
            );
            args.push("--mount".to_string());
            args.push(workspace_mount);
        }

        // Add additional mounts from configuration
        let mounts = crate::mount::MountParser::parse_mounts_from_json(&config.mounts);
        for mount in mounts {
            args.extend(mount.to_docker_args());
        }

        // Add mounts merged in from features and any entrypoint wrapper script
        for mount_arg in &merged_mounts.mounts {
            args.push("--mount".to_string());
            args.push(mount_arg.clone());
        }

        // Add GPU request
        match gpu_mode {
            crate::gpu::GpuMode::All => {
                args.push("--gpus".to_string());
                args.push("all".to_string());
            }
            crate::gpu::GpuMode::Detect => {
                let capability = self.detect_gpu_capability().await;
                if capability.available {
                    args.push("--gpus".to_string());
                    args.push("all".to_string());
                } else {
                    debug!("GPU mode 'detect' requested but no GPU-capable runtime found");
                }
            }
            crate::gpu::GpuMode::None => {}
        }

        // Add merged security options
        if merged_security.privileged {
            args.push("--privileged".to_string());
        }
        if let Some(init) = merged_security.init {
            if init {
                args.push("--init".to_string());
            }
        }
        for cap in &merged_security.cap_add {
            args.push("--cap-add".to_string());
            args.push(cap.clone());
        }
        for opt in &merged_security.security_opt {
            args.push("--security-opt".to_string());
            args.push(opt.clone());
        }

        // Add runArgs if present
        args.extend(config.run_args.iter().cloned());

        // Add image
        let image = config.image.as_ref().ok_or_else(|| {
            DockerError::CLIError("No image specified in configuration".to_string())
        })?;
        args.push(image.clone());

        // Execute docker create command
        let docker_path = self.docker_path.clone();
        let container_id = tokio::task::spawn_blocking(move || {
            let output = Command::new(&docker_path)
                .args(&args)
                .output()
                .map_err(|e| DockerError::CLIError(format!("Failed to create container: {}", e)))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(DockerError::CLIError(format!(
                    "Docker create failed: {}",
                    stderr
                )));
            }

            let stdout = String::from_utf8(output.stdout).map_err(|e| {
                DockerError::CLIError(format!("Invalid UTF-8 in docker output: {}", e))
            })?;

            Ok(stdout.trim().to_string())
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))??;

        debug!("Created container with ID: {}", container_id);
        Ok(container_id)
    }

    #[instrument(skip(self))]
    async fn commit_container(&self, container_id: &str, image_tag: &str) -> Result<()> {
        debug!("Committing container {} to image {}", container_id, image_tag);

        let docker_path = self.docker_path.clone();
        let container_id = container_id.to_string();
        let image_tag = image_tag.to_string();

        tokio::task::spawn_blocking(move || -> std::result::Result<(), DockerError> {
            let output = Command::new(&docker_path)
                .args(["commit", &container_id, &image_tag])
                .output()
                .map_err(|e| DockerError::CLIError(format!("Failed to commit container: {}", e)))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(DockerError::CLIError(format!(
                    "Docker commit failed: {}",
                    stderr
                )));
            }

            Ok(())
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))?
        .map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn start_container(&self, container_id: &str) -> Result<()> {
        debug!("Starting container: {}", container_id);

        let docker_path = self.docker_path.clone();
        let container_id = container_id.to_string();

        tokio::task::spawn_blocking(move || -> std::result::Result<(), DockerError> {
            let output = Command::new(&docker_path)
                .args(["start", &container_id])
                .output()
                .map_err(|e| DockerError::CLIError(format!("Failed to start container: {}", e)))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(DockerError::CLIError(format!(
                    "Docker start failed: {}",
                    stderr
                )));
            }

            Ok(())
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))?
        .map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, container_id: &str) -> Result<()> {
        debug!("Removing container: {}", container_id);

        let docker_path = self.docker_path.clone();
        let container_id = container_id.to_string();

        tokio::task::spawn_blocking(move || -> std::result::Result<(), DockerError> {
            let output = Command::new(&docker_path)
                .args(["rm", "-f", &container_id])
                .output()
                .map_err(|e| DockerError::CLIError(format!("Failed to remove container: {}", e)))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(DockerError::CLIError(format!(
                    "Docker rm failed: {}",
                    stderr
                )));
            }

            Ok(())
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))?
        .map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn get_container_image(&self, container_id: &str) -> Result<String> {
        debug!("Getting image for container: {}", container_id);

        let docker_path = self.docker_path.clone();
        let container_id = container_id.to_string();

        tokio::task::spawn_blocking(move || -> std::result::Result<String, DockerError> {
            let output = Command::new(&docker_path)
                .args(["inspect", "--format", "{{.Image}}", &container_id])
                .output()
                .map_err(|e| {
                    DockerError::CLIError(format!("Failed to inspect container: {}", e))
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(DockerError::CLIError(format!(
                    "Docker inspect failed: {}",
                    stderr
                )));
            }

            let stdout = String::from_utf8(output.stdout).map_err(|e| {
                DockerError::CLIError(format!("Invalid UTF-8 in docker output: {}", e))
            })?;

            Ok(stdout.trim().to_string())
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))?
        .map_err(Into::into)
    }
}

#[cfg(feature = "docker")]
impl DockerLifecycle for CliDocker {
    #[instrument(skip(self, config, merged_security, merged_mounts, entrypoint_chain))]
    async fn up(
        &self,
        identity: &ContainerIdentity,
        config: &DevContainerConfig,
        workspace_path: &Path,
        remove_existing: bool,
        gpu_mode: crate::gpu::GpuMode,
        merged_security: &crate::features::MergedSecurityOptions,
        merged_mounts: &crate::mount::MergedMounts,
        entrypoint_chain: &crate::features::EntrypointChain,
    ) -> Result<ContainerResult> {
        debug!("Starting up container workflow");

        // Find existing containers
        let existing_containers = self.find_matching_containers(identity).await?;

        if !existing_containers.is_empty() && !remove_existing {
            // Reuse existing container
            let container_id = existing_containers[0].clone();
            debug!("Reusing existing container: {}", container_id);

            // Start the container if it's not running
            self.start_container(&container_id).await?;

            // Get the image ID
            let image_id = self.get_container_image(&container_id).await?;

            return Ok(ContainerResult {
                container_id,
                reused: true,
                image_id,
            });
        }

        // Remove existing containers if requested
        if remove_existing {
            for container_id in existing_containers {
                debug!("Removing existing container: {}", container_id);
                self.remove_container(&container_id).await?;
            }
        }

        // Apply the resolved entrypoint override, if any, via run_args so
        // create_container's signature stays free of feature-install concerns.
        let mut config = config.clone();
        match entrypoint_chain {
            crate::features::EntrypointChain::None => {}
            crate::features::EntrypointChain::Single(path) => {
                config.run_args.push("--entrypoint".to_string());
                config.run_args.push(path.clone());
            }
            crate::features::EntrypointChain::Chained { wrapper_path, .. } => {
                config.run_args.push("--entrypoint".to_string());
                config.run_args.push(wrapper_path.clone());
            }
        }

        // Create new container
        let container_id = self
            .create_container(
                identity,
                &config,
                workspace_path,
                gpu_mode,
                merged_security,
                merged_mounts,
            )
            .await?;
        self.start_container(&container_id).await?;

        // Get the image ID
        let image_id = self.get_container_image(&container_id).await?;

        debug!(
            "Successfully created and started new container: {}",
            container_id
        );

        Ok(ContainerResult {
            container_id,
            reused: false,
            image_id,
        })
    }
}
// Non-docker feature fallback
#[cfg(not(feature = "docker"))]
pub struct DockerClient;

#[cfg(not(feature = "docker"))]
impl DockerClient {
    pub fn new() -> anyhow::Result<Self> {
        Ok(DockerClient)
    }
}

#[cfg(not(feature = "docker"))]
impl Default for DockerClient {
    fn default() -> Self {
        Self::new().expect("Failed to create default Docker client")
    }
}
