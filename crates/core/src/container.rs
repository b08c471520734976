//! Container lifecycle management and hashing utilities
//!
//! This module provides container lifecycle operations including creation, starting,
//! reuse logic, and identification labels according to the DevContainer specification.

use crate::config::DevContainerConfig;
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, instrument};

/// Label carrying the workspace id, used both to tag and to discover a
/// workspace's container.
pub const LABEL_WORKSPACE: &str = "crib.workspace";
/// Informational label carrying the devcontainer.json `name`, if set.
pub const LABEL_NAME: &str = "devcontainer.name";

/// Container identification and configuration.
///
/// `workspace_hash` despite the name now holds the spec's slug-based
/// workspace id (see [`crate::workspace_store::workspace_id`]), not a
/// content hash; the field kept its name to avoid rippling a rename through
/// every call site that threads it through as a state-store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerIdentity {
    /// Workspace id (slug of the project directory basename).
    pub workspace_hash: String,
    /// Hash of the configuration content, used to key build caches.
    pub config_hash: String,
    /// Human-readable name
    pub name: Option<String>,
    /// Custom container name (overrides generated name)
    pub custom_name: Option<String>,
}

/// Container creation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerResult {
    /// Container ID
    #[serde(rename = "containerId")]
    pub container_id: String,
    /// Whether the container was reused
    pub reused: bool,
    /// Image ID used for the container
    #[serde(rename = "imageId")]
    pub image_id: String,
}

/// Container operations for lifecycle management
#[allow(async_fn_in_trait)]
pub trait ContainerOps {
    /// Find existing containers with matching workspace and config hashes
    async fn find_matching_containers(&self, identity: &ContainerIdentity) -> Result<Vec<String>>;

    /// Create a new container with the specified identity and configuration
    async fn create_container(
        &self,
        identity: &ContainerIdentity,
        config: &DevContainerConfig,
        workspace_path: &Path,
        gpu_mode: crate::gpu::GpuMode,
        merged_security: &crate::features::MergedSecurityOptions,
        merged_mounts: &crate::mount::MergedMounts,
    ) -> Result<String>;

    /// Start a container by ID
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Remove a container by ID
    async fn remove_container(&self, container_id: &str) -> Result<()>;

    /// Get container image ID
    async fn get_container_image(&self, container_id: &str) -> Result<String>;

    /// Commit a running container's filesystem to a new image tag.
    async fn commit_container(&self, container_id: &str, image_tag: &str) -> Result<()>;
}

impl ContainerIdentity {
    /// Create a new container identity from workspace path and configuration
    #[instrument(skip(config))]
    pub fn new(workspace_path: &Path, config: &DevContainerConfig) -> Self {
        Self::new_with_custom_name(workspace_path, config, None)
    }

    /// Create a new container identity with optional custom container name
    #[instrument(skip(config))]
    pub fn new_with_custom_name(
        workspace_path: &Path,
        config: &DevContainerConfig,
        custom_name: Option<String>,
    ) -> Self {
        let workspace_hash = Self::hash_workspace_path(workspace_path);
        let config_hash = Self::hash_config(config);
        let name = config.name.clone();

        debug!(
            workspace_hash = %workspace_hash,
            config_hash = %config_hash,
            name = ?name,
            custom_name = ?custom_name,
            "Created container identity"
        );

        Self {
            workspace_hash,
            config_hash,
            name,
            custom_name,
        }
    }

    /// Derive the workspace id from the project directory's basename.
    fn hash_workspace_path(workspace_path: &Path) -> String {
        use crate::workspace::resolve_workspace_root;
        use crate::workspace_store::workspace_id;

        // Use worktree-aware resolution to get the canonical workspace root
        let canonical_path = resolve_workspace_root(workspace_path).unwrap_or_else(|_| {
            workspace_path
                .canonicalize()
                .unwrap_or_else(|_| workspace_path.to_path_buf())
        });

        let basename = canonical_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        workspace_id(&basename)
    }

    /// Generate a deterministic hash from the configuration
    fn hash_config(config: &DevContainerConfig) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        // Create a normalized representation with deterministic key ordering for hashing
        let mut value = serde_json::to_value(config).unwrap_or(Value::Null);
        canonicalize_json(&mut value);
        let normalized = serde_json::to_string(&value).unwrap_or_default();

        let mut hasher = DefaultHasher::new();
        normalized.hash(&mut hasher);
        let hash = hasher.finish();

        // Use first 8 characters for short hash
        format!("{:016x}", hash)[..8].to_string()
    }

    /// Generate the container name: `crib-<workspace-id>`, or the custom
    /// name when one was given via `devContainer.runArgs`/`--name`-style overrides.
    pub fn container_name(&self) -> String {
        if let Some(ref custom_name) = self.custom_name {
            return custom_name.clone();
        }
        format!("crib-{}", self.workspace_hash)
    }

    /// Generate labels for the container. `crib.workspace` is the sole
    /// discovery key; `devcontainer.name` is informational only.
    pub fn labels(&self) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert(LABEL_WORKSPACE.to_string(), self.workspace_hash.clone());

        if let Some(ref name) = self.name {
            labels.insert(LABEL_NAME.to_string(), name.clone());
        }

        labels
    }

    /// Create a label selector string for finding this workspace's container.
    pub fn label_selector(&self) -> String {
        format!("{}={}", LABEL_WORKSPACE, self.workspace_hash)
    }
}

fn canonicalize_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map
                .iter_mut()
                .map(|(k, v)| (k.clone(), std::mem::take(v)))
                .collect();
            map.clear();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, mut val) in entries {
                canonicalize_json(&mut val);
                map.insert(key, val);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                canonicalize_json(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_container_identity_creation() {
        let temp_dir = TempDir::new().unwrap();
        let workspace_path = temp_dir.path();

        let config = DevContainerConfig {
            name: Some("test-container".to_string()),
            image: Some("ubuntu:20.04".to_string()),
            ..Default::default()
        };

        let identity = ContainerIdentity::new(workspace_path, &config);

        assert!(!identity.workspace_hash.is_empty());
        assert!(!identity.config_hash.is_empty());
        assert_eq!(identity.name, Some("test-container".to_string()));
        assert_eq!(identity.config_hash.len(), 8);
    }

    #[test]
    fn test_container_name_generation() {
        let temp_dir = TempDir::new().unwrap();
        let workspace_path = temp_dir.path();

        let config = DevContainerConfig {
            name: Some("test".to_string()),
            image: Some("ubuntu:20.04".to_string()),
            ..Default::default()
        };

        let identity = ContainerIdentity::new(workspace_path, &config);
        let name = identity.container_name();

        assert!(name.starts_with("crib-"));
        assert_eq!(name, format!("crib-{}", identity.workspace_hash));
    }

    #[test]
    fn test_container_name_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        let workspace_path = temp_dir.path();

        let config = DevContainerConfig {
            name: Some("test".to_string()),
            image: Some("ubuntu:20.04".to_string()),
            ..Default::default()
        };

        let identity1 = ContainerIdentity::new(workspace_path, &config);
        let identity2 = ContainerIdentity::new(workspace_path, &config);

        assert_eq!(identity1.container_name(), identity2.container_name());
    }

    #[test]
    fn test_labels_generation() {
        let temp_dir = TempDir::new().unwrap();
        let workspace_path = temp_dir.path();

        let config = DevContainerConfig {
            name: Some("test-container".to_string()),
            image: Some("ubuntu:20.04".to_string()),
            ..Default::default()
        };

        let identity = ContainerIdentity::new(workspace_path, &config);
        let labels = identity.labels();

        assert_eq!(labels.get(LABEL_WORKSPACE), Some(&identity.workspace_hash));
        assert_eq!(labels.get(LABEL_NAME), Some(&"test-container".to_string()));
    }

    #[test]
    fn test_label_selector() {
        let temp_dir = TempDir::new().unwrap();
        let workspace_path = temp_dir.path();

        let config = DevContainerConfig {
            name: Some("test".to_string()),
            image: Some("ubuntu:20.04".to_string()),
            ..Default::default()
        };

        let identity = ContainerIdentity::new(workspace_path, &config);
        let selector = identity.label_selector();

        assert_eq!(
            selector,
            format!("{}={}", LABEL_WORKSPACE, identity.workspace_hash)
        );
    }

    #[test]
    fn test_config_hash_different_configs() {
        let temp_dir = TempDir::new().unwrap();
        let workspace_path = temp_dir.path();

        let config1 = DevContainerConfig {
            name: Some("test1".to_string()),
            image: Some("ubuntu:20.04".to_string()),
            ..Default::default()
        };

        let config2 = DevContainerConfig {
            name: Some("test2".to_string()),
            image: Some("ubuntu:22.04".to_string()),
            ..Default::default()
        };

        let identity1 = ContainerIdentity::new(workspace_path, &config1);
        let identity2 = ContainerIdentity::new(workspace_path, &config2);

        assert_ne!(identity1.config_hash, identity2.config_hash);
    }

    #[test]
    fn test_workspace_hash_different_paths() {
        let temp_dir1 = TempDir::new().unwrap();
        let temp_dir2 = TempDir::new().unwrap();

        let config = DevContainerConfig {
            name: Some("test".to_string()),
            image: Some("ubuntu:20.04".to_string()),
            ..Default::default()
        };

        let identity1 = ContainerIdentity::new(temp_dir1.path(), &config);
        let identity2 = ContainerIdentity::new(temp_dir2.path(), &config);

        assert_ne!(identity1.workspace_hash, identity2.workspace_hash);
    }

    #[test]
    fn test_custom_container_name() {
        let temp_dir = TempDir::new().unwrap();
        let workspace_path = temp_dir.path();

        let config = DevContainerConfig {
            name: Some("test".to_string()),
            image: Some("ubuntu:20.04".to_string()),
            ..Default::default()
        };

        let custom_name = Some("my-custom-container".to_string());
        let identity =
            ContainerIdentity::new_with_custom_name(workspace_path, &config, custom_name.clone());

        // Verify custom name is used
        assert_eq!(identity.container_name(), "my-custom-container");
        assert_eq!(identity.custom_name, custom_name);

        // Verify without custom name, generated name is used
        let identity_no_custom = ContainerIdentity::new(workspace_path, &config);
        assert!(identity_no_custom.container_name().starts_with("crib-"));
        assert_eq!(identity_no_custom.custom_name, None);
    }

    #[test]
    fn test_hash_config_deterministic_with_maps() {
        let mut config = DevContainerConfig {
            name: Some("test".to_string()),
            image: Some("ubuntu:20.04".to_string()),
            ..Default::default()
        };

        config
            .remote_env
            .insert("ALPHA".to_string(), Some("1".to_string()));
        config
            .remote_env
            .insert("BETA".to_string(), Some("2".to_string()));

        let hash1 = ContainerIdentity::hash_config(&config);
        let hash2 = ContainerIdentity::hash_config(&config);

        assert_eq!(hash1, hash2);
    }
}
