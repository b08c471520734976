//! `MergeConfiguration`: overlay a base [`DevContainerConfig`] with the
//! [`ImageMetadata`] contributed by Features (and, eventually, by an image's
//! own `devcontainer.metadata` label) to produce the effective config a
//! container is built and started from.

use crate::config::DevContainerConfig;
use crate::features::FeatureMetadata;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The subset of config a Feature (or an image's `devcontainer.metadata`
/// label) can contribute as an overlay on top of the base config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub remote_env: IndexMap<String, Option<String>>,
    #[serde(default)]
    pub container_env: IndexMap<String, String>,
    #[serde(default)]
    pub ports_attributes: IndexMap<String, Value>,
    #[serde(default)]
    pub mounts: Vec<Value>,
    #[serde(default)]
    pub cap_add: Vec<String>,
    #[serde(default)]
    pub security_opt: Vec<String>,
    #[serde(default)]
    pub forward_ports: Vec<Value>,
    pub init: Option<bool>,
    pub privileged: Option<bool>,
    pub remote_user: Option<String>,
    pub container_user: Option<String>,
    pub override_command: Option<bool>,
    pub update_remote_user_uid: Option<bool>,
    pub on_create_command: Option<Value>,
    pub update_content_command: Option<Value>,
    pub post_create_command: Option<Value>,
    pub post_start_command: Option<Value>,
    pub post_attach_command: Option<Value>,
}

/// Result of overlaying metadata entries onto a base config: the effective
/// scalar/map/list fields, plus the two ordered lists downstream consumers
/// (the lifecycle runner, compose/image layering) iterate directly.
#[derive(Debug, Clone, Default)]
pub struct MergedConfiguration {
    pub remote_user: Option<String>,
    pub container_user: Option<String>,
    pub init: Option<bool>,
    pub privileged: Option<bool>,
    pub override_command: Option<bool>,
    pub update_remote_user_uid: Option<bool>,
    pub remote_env: IndexMap<String, Option<String>>,
    pub container_env: IndexMap<String, String>,
    pub ports_attributes: IndexMap<String, Value>,
    pub forward_ports: Vec<Value>,
    pub cap_add: Vec<String>,
    pub security_opt: Vec<String>,
    pub mounts: Vec<Value>,
    /// Ordered hook maps the lifecycle runner iterates: reversed metadata
    /// entries first, then the base config last.
    pub lifecycle_hooks: Vec<LifecycleHookSet>,
    /// Ordered entrypoints, reversed-metadata-first, for compose/image layering.
    pub entrypoints: Vec<String>,
}

/// One entry's worth of named lifecycle hooks, carried as opaque JSON
/// values (already-normalized [`crate::container_lifecycle::LifecycleCommandValue`]
/// shapes at the point of use).
#[derive(Debug, Clone, Default)]
pub struct LifecycleHookSet {
    pub on_create_command: Option<Value>,
    pub update_content_command: Option<Value>,
    pub post_create_command: Option<Value>,
    pub post_start_command: Option<Value>,
    pub post_attach_command: Option<Value>,
}

impl From<&FeatureMetadata> for ImageMetadata {
    /// Lift a Feature's parsed `devcontainer-feature.json` metadata into the
    /// generic overlay shape `merge_configuration` consumes. Mounts aren't
    /// carried here: they're raw mount-spec strings, merged separately by
    /// [`crate::mount::merge_mounts`].
    fn from(metadata: &FeatureMetadata) -> Self {
        ImageMetadata {
            entrypoint: metadata.entrypoint.clone(),
            remote_env: metadata.remote_env.clone().into_iter().collect(),
            container_env: metadata.container_env.clone().into_iter().collect(),
            ports_attributes: IndexMap::new(),
            mounts: Vec::new(),
            cap_add: metadata.cap_add.clone(),
            security_opt: metadata.security_opt.clone(),
            forward_ports: Vec::new(),
            init: metadata.init,
            privileged: metadata.privileged,
            remote_user: metadata.remote_user.clone(),
            container_user: metadata.container_user.clone(),
            override_command: metadata.override_command,
            update_remote_user_uid: metadata.update_remote_user_uid,
            on_create_command: metadata.on_create_command.clone(),
            update_content_command: metadata.update_content_command.clone(),
            post_create_command: metadata.post_create_command.clone(),
            post_start_command: metadata.post_start_command.clone(),
            post_attach_command: metadata.post_attach_command.clone(),
        }
    }
}

fn mount_target(mount: &Value) -> Option<String> {
    mount
        .get("target")
        .or_else(|| mount.get("destination"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Merge `base` with `metadata_entries` (already in install order — the
/// function reverses them itself). The base config always wins for a given
/// scalar if it is set; Feature overlays are consulted in reverse
/// (last-installed wins over earlier Features).
pub fn merge_configuration(
    base: &DevContainerConfig,
    metadata_entries: &[ImageMetadata],
) -> MergedConfiguration {
    let reversed: Vec<&ImageMetadata> = metadata_entries.iter().rev().collect();

    let mut merged = MergedConfiguration::default();

    merged.remote_user = first_scalar(base.remote_user.clone(), &reversed, |m| {
        m.remote_user.clone()
    });
    merged.container_user = first_scalar(base.container_user.clone(), &reversed, |m| {
        m.container_user.clone()
    });
    merged.init = first_scalar(base.init, &reversed, |m| m.init);
    merged.privileged = first_scalar(base.privileged, &reversed, |m| m.privileged);
    merged.override_command = first_scalar(base.override_command, &reversed, |m| {
        m.override_command
    });
    merged.update_remote_user_uid = first_scalar(base.update_remote_user_uid, &reversed, |m| {
        m.update_remote_user_uid
    });

    // Maps: entries merge in (reversed) order, then base keys overlay on top.
    let mut remote_env = IndexMap::new();
    let mut container_env = IndexMap::new();
    let mut ports_attributes = IndexMap::new();
    for entry in &reversed {
        for (k, v) in &entry.remote_env {
            remote_env.insert(k.clone(), v.clone());
        }
        for (k, v) in &entry.container_env {
            container_env.insert(k.clone(), v.clone());
        }
        for (k, v) in &entry.ports_attributes {
            ports_attributes.insert(k.clone(), v.clone());
        }
    }
    for (k, v) in &base.remote_env {
        remote_env.insert(k.clone(), v.clone());
    }
    for (k, v) in &base.container_env {
        container_env.insert(k.clone(), v.clone());
    }
    merged.remote_env = remote_env;
    merged.container_env = container_env;
    merged.ports_attributes = ports_attributes;

    // Deduplicating lists: base first (preserving order), then each entry's items.
    merged.forward_ports = dedup_list(
        base.forward_ports.clone(),
        reversed.iter().flat_map(|m| m.forward_ports.iter().cloned()),
        |v| v.to_string(),
    );
    merged.cap_add = dedup_list(
        base.cap_add.clone(),
        reversed.iter().flat_map(|m| m.cap_add.iter().cloned()),
        |s| s.clone(),
    );
    merged.security_opt = dedup_list(
        base.security_opt.clone(),
        reversed.iter().flat_map(|m| m.security_opt.iter().cloned()),
        |s| s.clone(),
    );

    // Mounts: union by target, base first, later duplicates discarded.
    let mut seen_targets = std::collections::HashSet::new();
    let mut mounts = Vec::new();
    for mount in base.mounts.iter().chain(reversed.iter().flat_map(|m| m.mounts.iter())) {
        match mount_target(mount) {
            Some(target) if !target.is_empty() => {
                if seen_targets.insert(target) {
                    mounts.push(mount.clone());
                }
            }
            _ => {}
        }
    }
    merged.mounts = mounts;

    // Lifecycle hooks: reversed entries first, base last.
    let mut lifecycle_hooks: Vec<LifecycleHookSet> = reversed
        .iter()
        .map(|m| LifecycleHookSet {
            on_create_command: m.on_create_command.clone(),
            update_content_command: m.update_content_command.clone(),
            post_create_command: m.post_create_command.clone(),
            post_start_command: m.post_start_command.clone(),
            post_attach_command: m.post_attach_command.clone(),
        })
        .collect();
    lifecycle_hooks.push(LifecycleHookSet {
        on_create_command: base.on_create_command.clone(),
        update_content_command: base.update_content_command.clone(),
        post_create_command: base.post_create_command.clone(),
        post_start_command: base.post_start_command.clone(),
        post_attach_command: base.post_attach_command.clone(),
    });
    merged.lifecycle_hooks = lifecycle_hooks;

    // Entrypoints: reversed-entries-first ordered list (base has no entrypoint field today).
    merged.entrypoints = reversed
        .iter()
        .filter_map(|m| m.entrypoint.clone())
        .collect();

    merged
}

fn first_scalar<T: Clone>(
    base_value: Option<T>,
    reversed: &[&ImageMetadata],
    extract: impl Fn(&ImageMetadata) -> Option<T>,
) -> Option<T> {
    if base_value.is_some() {
        return base_value;
    }
    reversed.iter().find_map(|m| extract(m))
}

fn dedup_list<T: Clone>(
    base: Vec<T>,
    rest: impl Iterator<Item = T>,
    key: impl Fn(&T) -> String,
) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in base.into_iter().chain(rest) {
        if seen.insert(key(&item)) {
            out.push(item);
        }
    }
    out
}
