//! Persistent per-workspace state.
//!
//! A directory-per-workspace layout under a configurable root
//! (`$CRIB_HOME/workspaces/` or `$HOME/.crib/workspaces/`). Each workspace
//! directory carries `workspace.json` (the [`Workspace`]), `result.json`
//! (the [`WorkspaceResult`] of the last successful `Up`), and a `hooks/`
//! directory of `<hookName>.done` marker files used to make create-time
//! lifecycle hooks idempotent across recreate cycles.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Identity for one project, created on first `Up` and destroyed by `Remove`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    /// Slug of the project directory basename (see [`workspace_id`]).
    pub id: String,
    /// Absolute project path.
    pub source: PathBuf,
    /// Relative path to the devcontainer config file, from `source`.
    pub dev_container_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(id: String, source: PathBuf, dev_container_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            source,
            dev_container_path,
            created_at: now,
            last_used_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_used_at = Utc::now();
    }
}

/// Outcome of the last successful `Up`.
///
/// Written twice per `Up`: an early write right after the container exists
/// (so `exec`/`shell` work while hooks run), and a final write with the
/// post-hook environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkspaceResult {
    pub container_id: String,
    /// Empty when the image is used unmodified (no feature/Dockerfile build).
    #[serde(default)]
    pub image_name: String,
    /// Opaque serialized snapshot of the config used, for change detection.
    pub merged_config: serde_json::Value,
    /// Path inside the container where the project is mounted.
    pub workspace_folder: String,
    /// Resolved name -> value, including probed user environment and
    /// `${containerEnv:*}` expansion.
    #[serde(default)]
    pub remote_env: HashMap<String, Option<String>>,
    pub remote_user: Option<String>,
}

/// Compute the slug workspace id for a project directory.
///
/// Lowercased, non-alphanumeric -> `-`, trimmed; empty -> `"workspace"`;
/// truncated to 40 chars + `-` + first 7 hex of sha256(original) when
/// longer, capped at 48 total.
pub fn workspace_id(project_dir_basename: &str) -> String {
    let lowered = project_dir_basename.to_lowercase();
    let slug: String = lowered
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let trimmed = slug.trim_matches('-').to_string();

    if trimmed.is_empty() {
        return "workspace".to_string();
    }

    if trimmed.len() <= 48 {
        return trimmed;
    }

    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(project_dir_basename.as_bytes());
    let digest = hasher.finalize();
    let hex_prefix: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    let hex_prefix = &hex_prefix[..7];

    let truncated: String = trimmed.chars().take(40).collect();
    format!("{}-{}", truncated, hex_prefix)
}

/// Persistent on-disk store for workspace identities, results and hook markers.
pub struct WorkspaceStore {
    root: PathBuf,
}

impl WorkspaceStore {
    /// Open the store rooted at `$CRIB_HOME/workspaces` (default
    /// `$HOME/.crib/workspaces`).
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_root()?)
    }

    /// Open the store rooted at an explicit `workspaces/` directory.
    pub fn open(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("creating workspace store root {:?}", root))?;
        Ok(Self { root })
    }

    fn default_root() -> Result<PathBuf> {
        let home = if let Ok(crib_home) = std::env::var("CRIB_HOME") {
            PathBuf::from(crib_home)
        } else {
            directories_next::UserDirs::new()
                .map(|dirs| dirs.home_dir().join(".crib"))
                .context("resolving home directory for default CRIB_HOME")?
        };
        Ok(home.join("workspaces"))
    }

    fn workspace_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn workspace_json_path(&self, id: &str) -> PathBuf {
        self.workspace_dir(id).join("workspace.json")
    }

    fn result_json_path(&self, id: &str) -> PathBuf {
        self.workspace_dir(id).join("result.json")
    }

    fn hooks_dir(&self, id: &str) -> PathBuf {
        self.workspace_dir(id).join("hooks")
    }

    /// Persist a [`Workspace`].
    #[instrument(skip(self, workspace), fields(id = %workspace.id))]
    pub fn save_workspace(&self, workspace: &Workspace) -> Result<()> {
        let dir = self.workspace_dir(&workspace.id);
        fs::create_dir_all(&dir).with_context(|| format!("creating workspace dir {:?}", dir))?;
        let path = self.workspace_json_path(&workspace.id);
        let json = serde_json::to_string_pretty(workspace)?;
        fs::write(&path, json).with_context(|| format!("writing {:?}", path))?;
        debug!("saved workspace");
        Ok(())
    }

    pub fn load_workspace(&self, id: &str) -> Result<Option<Workspace>> {
        let path = self.workspace_json_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
        let workspace = serde_json::from_str(&content)
            .with_context(|| format!("parsing workspace.json for {}", id))?;
        Ok(Some(workspace))
    }

    pub fn workspace_exists(&self, id: &str) -> bool {
        self.workspace_json_path(id).exists()
    }

    /// Enumerate subdirectories of the store root that contain `workspace.json`.
    pub fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let mut workspaces = Vec::new();
        if !self.root.exists() {
            return Ok(workspaces);
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str() {
                if let Some(workspace) = self.load_workspace(id)? {
                    workspaces.push(workspace);
                }
            }
        }
        workspaces.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workspaces)
    }

    /// Delete the workspace directory entirely (used by `Remove`).
    #[instrument(skip(self))]
    pub fn delete_workspace(&self, id: &str) -> Result<()> {
        let dir = self.workspace_dir(id);
        if dir.exists() {
            fs::remove_dir_all(&dir).with_context(|| format!("removing workspace dir {:?}", dir))?;
            info!(id = %id, "removed workspace directory");
        }
        Ok(())
    }

    /// Persist a [`WorkspaceResult`] with owner-only (0600) permissions.
    #[instrument(skip(self, result))]
    pub fn save_result(&self, id: &str, result: &WorkspaceResult) -> Result<()> {
        let dir = self.workspace_dir(id);
        fs::create_dir_all(&dir).with_context(|| format!("creating workspace dir {:?}", dir))?;
        let path = self.result_json_path(id);
        let json = serde_json::to_string_pretty(result)?;
        fs::write(&path, json).with_context(|| format!("writing {:?}", path))?;
        Self::set_owner_only(&path)?;
        Ok(())
    }

    #[cfg(unix)]
    fn set_owner_only(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn set_owner_only(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Load the stored result, or `None` when absent (not an error).
    pub fn load_result(&self, id: &str) -> Result<Option<WorkspaceResult>> {
        let path = self.result_json_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
        let result = serde_json::from_str(&content)
            .with_context(|| format!("parsing result.json for {}", id))?;
        Ok(Some(result))
    }

    fn hook_marker_path(&self, id: &str, hook_name: &str) -> PathBuf {
        self.hooks_dir(id).join(format!("{}.done", hook_name))
    }

    /// Mark a create-time hook as having completed successfully.
    #[instrument(skip(self))]
    pub fn mark_hook_done(&self, id: &str, hook_name: &str) -> Result<()> {
        let hooks_dir = self.hooks_dir(id);
        fs::create_dir_all(&hooks_dir)
            .with_context(|| format!("creating hooks dir {:?}", hooks_dir))?;
        fs::write(self.hook_marker_path(id, hook_name), "")?;
        Ok(())
    }

    pub fn is_hook_done(&self, id: &str, hook_name: &str) -> bool {
        self.hook_marker_path(id, hook_name).exists()
    }

    /// Wipe all hook markers for a workspace. Idempotent: a missing hooks
    /// directory is not an error. Called on `Down` and on recreate.
    #[instrument(skip(self))]
    pub fn clear_hook_markers(&self, id: &str) -> Result<()> {
        let hooks_dir = self.hooks_dir(id);
        if hooks_dir.exists() {
            fs::remove_dir_all(&hooks_dir)
                .with_context(|| format!("clearing hooks dir {:?}", hooks_dir))?;
        }
        Ok(())
    }
}
