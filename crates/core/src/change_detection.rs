//! Classifies the effect of a configuration change between a previous run's
//! merged configuration and the current one, so `up` can decide whether a
//! container can be updated in place or must be rebuilt from scratch.

use crate::config::DevContainerConfig;
use serde::{Deserialize, Serialize};

/// The effect a detected configuration change has on the running container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Image or build-relevant fields changed; the container must be rebuilt.
    NeedsRebuild,
    /// A field that affects how the container is run (but not built) changed;
    /// recreating the container without a rebuild is sufficient.
    Safe,
    /// No relevant change detected.
    None,
}

/// Fields compared for [`ChangeKind::Safe`] changes. `remote_env` is
/// intentionally excluded — it is resolved at exec-time from the running
/// container's environment rather than baked in at creation, so a diff here
/// doesn't require recreating anything.
const SAFE_FIELDS: &[&str] = &[
    "container_env",
    "container_user",
    "remote_user",
    "workspace_mount",
    "workspace_folder",
    "mounts",
    "run_args",
    "app_port",
    "forward_ports",
    "init",
    "privileged",
    "cap_add",
    "security_opt",
    "override_command",
    "docker_compose_file",
    "service",
    "run_services",
];

/// Compares two configurations and classifies the result.
pub fn detect_change(previous: &DevContainerConfig, current: &DevContainerConfig) -> ChangeKind {
    if build_relevant_changed(previous, current) {
        return ChangeKind::NeedsRebuild;
    }
    if safe_fields_changed(previous, current) {
        return ChangeKind::Safe;
    }
    ChangeKind::None
}

fn build_relevant_changed(previous: &DevContainerConfig, current: &DevContainerConfig) -> bool {
    previous.image != current.image
        || previous.dockerfile != current.dockerfile
        || previous.build != current.build
        || previous.features != current.features
}

fn safe_fields_changed(previous: &DevContainerConfig, current: &DevContainerConfig) -> bool {
    previous.container_env != current.container_env
        || previous.container_user != current.container_user
        || previous.remote_user != current.remote_user
        || previous.workspace_mount != current.workspace_mount
        || previous.workspace_folder != current.workspace_folder
        || previous.mounts != current.mounts
        || previous.run_args != current.run_args
        || previous.app_port != current.app_port
        || previous.forward_ports != current.forward_ports
        || previous.init != current.init
        || previous.privileged != current.privileged
        || previous.cap_add != current.cap_add
        || previous.security_opt != current.security_opt
        || previous.override_command != current.override_command
        || previous.docker_compose_file != current.docker_compose_file
        || previous.service != current.service
        || previous.run_services != current.run_services
}

/// Returns the list of field names this module compares for [`ChangeKind::Safe`],
/// useful for diagnostics (e.g. `status --verbose` output) without duplicating
/// the list.
pub fn safe_field_names() -> &'static [&'static str] {
    SAFE_FIELDS
}
