//! Content-addressed build cache key.
//!
//! Produces a stable tag for the image a container is built from, so that an
//! unchanged Dockerfile/build context/feature set reuses a previous build
//! instead of triggering a rebuild.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Fields from [`crate::config::DevContainerConfig`] that participate in the
/// build cache key. Anything not build-relevant (lifecycle hooks, mounts,
/// env, ...) must NOT be included here or unrelated edits would bust the cache.
#[derive(Debug, Clone, Serialize)]
pub struct BuildRelevantFields {
    pub name: Option<String>,
    pub image: Option<String>,
    pub dockerfile: Option<String>,
    pub context: Option<String>,
    pub build_options: serde_json::Value,
    pub features: serde_json::Value,
}

/// Normalize the host architecture to the form used in OCI platform strings
/// (`amd64`, `arm64`, ...) rather than Rust's `std::env::consts::ARCH`.
pub fn normalized_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

/// Hash a build context directory: walk it honoring `.dockerignore`
/// (including parent-directory-relative match semantics), sort relative
/// paths for determinism, and mix each path and its content into a digest.
///
/// `include_files`, when non-empty, restricts which relative paths
/// contribute (used for Feature-only builds that only need their own
/// generated files hashed, not the whole workspace).
pub fn hash_build_context(context_dir: &Path, include_files: &[String]) -> Result<String> {
    let ignore_patterns = load_dockerignore(context_dir)?;

    let mut relative_paths = Vec::new();
    collect_files(context_dir, context_dir, &ignore_patterns, &mut relative_paths)?;
    relative_paths.sort();

    let mut hasher = Sha256::new();
    for relative_path in &relative_paths {
        if !include_files.is_empty() && !include_files.contains(relative_path) {
            continue;
        }
        let full_path = context_dir.join(relative_path);
        let content = std::fs::read(&full_path)
            .with_context(|| format!("reading build context file {:?}", full_path))?;
        hasher.update(relative_path.as_bytes());
        hasher.update(&content);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn collect_files(
    root: &Path,
    dir: &Path,
    ignore_patterns: &[String],
    out: &mut Vec<String>,
) -> Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading dir {:?}", dir))? {
        let entry = entry?;
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        if is_ignored(&relative, ignore_patterns) {
            continue;
        }

        if entry.file_type()?.is_dir() {
            collect_files(root, &path, ignore_patterns, out)?;
        } else {
            out.push(relative);
        }
    }
    Ok(())
}

fn load_dockerignore(context_dir: &Path) -> Result<Vec<String>> {
    let path = context_dir.join(".dockerignore");
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.to_string())
        .collect())
}

/// Whether `relative_path` matches a `.dockerignore` pattern. Patterns
/// ending in `/` or without wildcards match the path itself or any
/// descendant of it (parent-match semantics), mirroring Docker's
/// `.dockerignore` behavior for directory entries.
fn is_ignored(relative_path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| {
        let pattern = pattern.trim_end_matches('/');
        if pattern == relative_path {
            return true;
        }
        relative_path.starts_with(&format!("{}/", pattern))
    })
}

/// Compute the build cache key: `crib-<32 hex chars>`.
///
/// Mixes the normalized architecture, canonical JSON of the build-relevant
/// config fields, the raw Dockerfile content (when present), and the build
/// context content hash.
pub fn compute_prebuild_hash(
    fields: &BuildRelevantFields,
    dockerfile_content: Option<&str>,
    context_hash: &str,
) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(normalized_arch().as_bytes());

    let canonical_fields = canonicalize(&serde_json::to_value(fields)?);
    hasher.update(serde_json::to_string(&canonical_fields)?.as_bytes());

    if let Some(content) = dockerfile_content {
        hasher.update(content.as_bytes());
    }
    hasher.update(context_hash.as_bytes());

    let digest = hasher.finalize();
    let hex = format!("{:x}", digest);
    Ok(format!("crib-{}", &hex[..32]))
}

/// The full image tag produced for a workspace's build: `crib-<workspaceID>:crib-<32hex>`.
pub fn build_image_tag(workspace_id: &str, prebuild_hash: &str) -> String {
    format!("crib-{}:{}", workspace_id, prebuild_hash)
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(String, serde_json::Value)> =
                map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(entries.into_iter().collect())
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}
