//! List command implementation
//!
//! Implements the `crib list` subcommand (alias `ls`) for enumerating every
//! workspace ever brought up on this host, independent of whether its
//! container is currently running.

use anyhow::Result;
use crib_core::docker::{CliDocker, Docker};
use crib_core::workspace_store::WorkspaceStore;
use serde::Serialize;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct WorkspaceListEntry {
    pub id: String,
    pub source: String,
    pub state: String,
}

#[instrument]
pub async fn execute_list(_args: &ListArgs) -> Result<Vec<WorkspaceListEntry>> {
    let store = WorkspaceStore::open_default()?;
    let docker = CliDocker::new();

    let mut entries = Vec::new();
    for workspace in store.list_workspaces()? {
        let result = store.load_result(&workspace.id)?;
        let state = match result {
            Some(result) => match docker.inspect_container(&result.container_id).await? {
                Some(info) => info.state,
                None => "absent".to_string(),
            },
            None => "never-started".to_string(),
        };
        entries.push(WorkspaceListEntry {
            id: workspace.id,
            source: workspace.source.to_string_lossy().to_string(),
            state,
        });
    }

    Ok(entries)
}

pub fn render_list(entries: &[WorkspaceListEntry], json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(entries).unwrap_or_default();
    }
    if entries.is_empty() {
        return "no workspaces".to_string();
    }
    entries
        .iter()
        .map(|e| format!("{}\t{}\t{}", e.id, e.state, e.source))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_list_empty() {
        assert_eq!(render_list(&[], false), "no workspaces");
    }

    #[test]
    fn test_render_list_text() {
        let entries = vec![WorkspaceListEntry {
            id: "my-project".to_string(),
            source: "/home/user/my-project".to_string(),
            state: "running".to_string(),
        }];
        let rendered = render_list(&entries, false);
        assert!(rendered.contains("my-project"));
        assert!(rendered.contains("running"));
    }

    #[test]
    fn test_render_list_json() {
        let entries = vec![WorkspaceListEntry {
            id: "my-project".to_string(),
            source: "/home/user/my-project".to_string(),
            state: "running".to_string(),
        }];
        let rendered = render_list(&entries, true);
        assert!(rendered.contains("\"id\": \"my-project\""));
    }
}
