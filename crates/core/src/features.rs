//! DevContainer features system
//!
//! This module handles feature discovery, installation, and lifecycle management.

use crate::errors::{FeatureError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, instrument};

/// Processed option value supporting different types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Boolean(bool),
    String(String),
    Number(serde_json::Number),
    Array(Vec<serde_json::Value>),
    Object(serde_json::Map<String, serde_json::Value>),
    Null,
}

impl OptionValue {
    /// Get as boolean if it's a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as string if it's a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Feature option definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeatureOption {
    #[serde(rename = "boolean")]
    Boolean {
        #[serde(default)]
        default: Option<bool>,
        #[serde(default)]
        description: Option<String>,
    },
    #[serde(rename = "string")]
    String {
        #[serde(default)]
        default: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        r#enum: Option<Vec<String>>,
        #[serde(default)]
        proposals: Option<Vec<String>>,
    },
}

impl FeatureOption {
    /// Get the default value for this option
    pub fn default_value(&self) -> Option<OptionValue> {
        match self {
            FeatureOption::Boolean { default, .. } => default.map(OptionValue::Boolean),
            FeatureOption::String { default, .. } => {
                default.as_ref().map(|s| OptionValue::String(s.clone()))
            }
        }
    }

    /// Validate a value against this option definition
    pub fn validate_value(&self, value: &OptionValue) -> std::result::Result<(), String> {
        match (self, value) {
            (FeatureOption::Boolean { .. }, OptionValue::Boolean(_)) => Ok(()),
            (FeatureOption::String { r#enum, .. }, OptionValue::String(s)) => {
                if let Some(allowed_values) = r#enum {
                    if allowed_values.contains(s) {
                        Ok(())
                    } else {
                        Err(format!(
                            "Value '{}' is not one of the allowed values: {:?}",
                            s, allowed_values
                        ))
                    }
                } else {
                    Ok(())
                }
            }
            _ => Err("Type mismatch between option definition and provided value".to_string()),
        }
    }
}

/// Feature metadata structure representing devcontainer-feature.json
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMetadata {
    /// Feature identifier (required)
    pub id: String,

    /// Feature version
    #[serde(default)]
    pub version: Option<String>,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Feature description
    #[serde(default)]
    pub description: Option<String>,

    /// Documentation URL
    #[serde(default)]
    pub documentation_url: Option<String>,

    /// License URL
    #[serde(default)]
    pub license_url: Option<String>,

    /// Feature options
    #[serde(default)]
    pub options: HashMap<String, FeatureOption>,

    /// Container environment variables
    #[serde(default)]
    pub container_env: HashMap<String, String>,

    /// Container mounts
    #[serde(default)]
    pub mounts: Vec<String>,

    /// Whether to use init
    #[serde(default)]
    pub init: Option<bool>,

    /// Whether to run privileged
    #[serde(default)]
    pub privileged: Option<bool>,

    /// Capabilities to add
    #[serde(default)]
    pub cap_add: Vec<String>,

    /// Security options
    #[serde(default)]
    pub security_opt: Vec<String>,

    /// Entrypoint script this feature wants chained into the container's
    /// effective entrypoint.
    #[serde(default)]
    pub entrypoint: Option<String>,

    /// Remote user override contributed by this feature's image metadata.
    #[serde(default)]
    pub remote_user: Option<String>,

    /// Container user override contributed by this feature's image metadata.
    #[serde(default)]
    pub container_user: Option<String>,

    #[serde(default)]
    pub override_command: Option<bool>,

    #[serde(default)]
    pub update_remote_user_uid: Option<bool>,

    /// Remote environment variables contributed by this feature.
    #[serde(default)]
    pub remote_env: HashMap<String, Option<String>>,

    /// Features to install after
    #[serde(default)]
    pub installs_after: Vec<String>,

    /// Feature dependencies
    #[serde(default)]
    pub depends_on: HashMap<String, serde_json::Value>,

    /// onCreate lifecycle command
    #[serde(default)]
    pub on_create_command: Option<serde_json::Value>,

    /// updateContent lifecycle command
    #[serde(default)]
    pub update_content_command: Option<serde_json::Value>,

    /// postCreate lifecycle command
    #[serde(default)]
    pub post_create_command: Option<serde_json::Value>,

    /// postStart lifecycle command
    #[serde(default)]
    pub post_start_command: Option<serde_json::Value>,

    /// postAttach lifecycle command
    #[serde(default)]
    pub post_attach_command: Option<serde_json::Value>,
}

impl FeatureMetadata {
    /// Check if any lifecycle commands are present
    pub fn has_lifecycle_commands(&self) -> bool {
        self.on_create_command.is_some()
            || self.update_content_command.is_some()
            || self.post_create_command.is_some()
            || self.post_start_command.is_some()
            || self.post_attach_command.is_some()
    }

    /// Validate the feature metadata
    pub fn validate(&self) -> std::result::Result<(), FeatureError> {
        // Required field validation
        if self.id.is_empty() {
            return Err(FeatureError::Validation {
                message: "Feature id is required and cannot be empty".to_string(),
            });
        }

        // Validate option defaults
        for (option_name, option_def) in &self.options {
            if let Some(default_value) = option_def.default_value() {
                if let Err(err) = option_def.validate_value(&default_value) {
                    return Err(FeatureError::Validation {
                        message: format!(
                            "Default value for option '{}' is invalid: {}",
                            option_name, err
                        ),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Parse feature metadata from a devcontainer-feature.json file
#[instrument(level = "debug")]
pub fn parse_feature_metadata(path: &Path) -> Result<FeatureMetadata> {
    debug!("Parsing feature metadata from: {}", path.display());

    // Check if file exists
    if !path.exists() {
        return Err(FeatureError::NotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    // Read file content
    let content = std::fs::read_to_string(path).map_err(FeatureError::Io)?;

    // Parse JSON
    let metadata: FeatureMetadata =
        serde_json::from_str(&content).map_err(|e| FeatureError::Parsing {
            message: e.to_string(),
        })?;

    debug!(
        "Parsed feature: id={}, name={:?}",
        metadata.id, metadata.name
    );

    // Log options
    for (option_name, option_def) in &metadata.options {
        debug!("Option '{}': {:?}", option_name, option_def);
    }

    // Log lifecycle presence
    if metadata.has_lifecycle_commands() {
        debug!("Feature has lifecycle commands");
    }

    // Validate metadata
    metadata.validate()?;

    Ok(metadata)
}

/// A feature resolved from its devcontainer.json reference to a concrete
/// source and the metadata read from its `devcontainer-feature.json`.
#[derive(Debug, Clone)]
pub struct ResolvedFeature {
    /// Canonicalized feature id.
    pub id: String,
    /// Where the feature was fetched from (OCI reference, local path, etc).
    pub source: String,
    /// Per-feature option values from the devcontainer.json `features` map.
    pub options: HashMap<String, OptionValue>,
    /// Parsed `devcontainer-feature.json` contents.
    pub metadata: FeatureMetadata,
}

/// A dependency-ordered installation plan: features grouped into levels that
/// can each install concurrently, with all of a level's dependencies
/// satisfied by earlier levels.
#[derive(Debug, Clone)]
pub struct InstallationPlan {
    pub features: Vec<ResolvedFeature>,
    pub levels: Vec<Vec<String>>,
}

impl InstallationPlan {
    pub fn new(features: Vec<ResolvedFeature>) -> Self {
        Self {
            features,
            levels: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get_feature(&self, id: &str) -> Option<&ResolvedFeature> {
        self.features.iter().find(|f| f.id == id)
    }

    /// Installation order flattened out of `levels`.
    pub fn feature_ids(&self) -> Vec<String> {
        self.levels.iter().flatten().cloned().collect()
    }
}

/// Resolves Feature dependencies (`installsAfter`/`dependsOn`) into an
/// [`InstallationPlan`] via topological sort, detecting cycles.
pub struct FeatureDependencyResolver {
    override_order: Option<Vec<String>>,
}

impl FeatureDependencyResolver {
    pub fn new(override_order: Option<Vec<String>>) -> Self {
        Self { override_order }
    }

    /// Resolve `features` into levels: each level is a set of feature ids
    /// whose dependencies are all satisfied by prior levels. Independent
    /// features within a level are ordered lexicographically for
    /// determinism.
    pub fn resolve(&self, features: &[ResolvedFeature]) -> Result<InstallationPlan> {
        if let Some(order) = &self.override_order {
            self.validate_override_order(order, features)?;
            return Ok(InstallationPlan {
                features: features.to_vec(),
                levels: order.iter().map(|id| vec![id.clone()]).collect(),
            });
        }

        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        for feature in features {
            let mut deps: Vec<String> = feature.metadata.installs_after.clone();
            deps.extend(feature.metadata.depends_on.keys().cloned());
            deps.sort();
            deps.dedup();
            dependencies.insert(feature.id.clone(), deps);
        }

        for (id, deps) in &dependencies {
            for dep in deps {
                if !dependencies.contains_key(dep) {
                    return Err(FeatureError::InvalidDependency {
                        feature_id: id.clone(),
                        message: format!("depends on unknown feature '{}'", dep),
                    }
                    .into());
                }
            }
        }

        let mut satisfied: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut remaining: Vec<String> = dependencies.keys().cloned().collect();
        remaining.sort();
        let mut levels: Vec<Vec<String>> = Vec::new();

        while !remaining.is_empty() {
            let mut level: Vec<String> = remaining
                .iter()
                .filter(|id| {
                    dependencies[*id]
                        .iter()
                        .all(|dep| satisfied.contains(dep))
                })
                .cloned()
                .collect();

            if level.is_empty() {
                let mut chain = remaining.clone();
                chain.sort();
                return Err(FeatureError::DependencyCycle {
                    chain: chain.join(" -> "),
                }
                .into());
            }

            level.sort();
            remaining.retain(|id| !level.contains(id));
            for id in &level {
                satisfied.insert(id.clone());
            }
            levels.push(level);
        }

        Ok(InstallationPlan {
            features: features.to_vec(),
            levels,
        })
    }

    fn validate_override_order(
        &self,
        order: &[String],
        features: &[ResolvedFeature],
    ) -> Result<()> {
        for id in order {
            if !features.iter().any(|f| &f.id == id) {
                return Err(FeatureError::InvalidDependency {
                    feature_id: id.clone(),
                    message: "listed in override install order but not present in config"
                        .to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// The effective entrypoint a container is started with, once Feature
/// entrypoints are chained alongside any image/config entrypoint.
#[derive(Debug, Clone, PartialEq)]
pub enum EntrypointChain {
    /// No feature or config entrypoint to apply; image default is used.
    None,
    /// Exactly one entrypoint applies untouched.
    Single(String),
    /// Multiple entrypoints must be chained through a generated wrapper
    /// script, written at `wrapper_path` inside the container.
    Chained {
        wrapper_path: String,
        entrypoints: Vec<String>,
    },
}

/// Build the entrypoint chain from installed features (in installation
/// order) and an optional config/image entrypoint, which runs last.
pub fn build_entrypoint_chain(
    features: &[ResolvedFeature],
    config_entrypoint: Option<&str>,
) -> EntrypointChain {
    let mut entrypoints: Vec<String> = features
        .iter()
        .filter_map(|f| f.metadata.entrypoint.clone())
        .collect();

    if let Some(config_entrypoint) = config_entrypoint {
        entrypoints.push(config_entrypoint.to_string());
    }

    match entrypoints.len() {
        0 => EntrypointChain::None,
        1 => EntrypointChain::Single(entrypoints.remove(0)),
        _ => EntrypointChain::Chained {
            wrapper_path: "/usr/local/share/crib-entrypoint-wrapper.sh".to_string(),
            entrypoints,
        },
    }
}

/// Generate a POSIX shell wrapper that execs each entrypoint in order,
/// finally handing off to the container's own command via `exec "$@"`.
pub fn generate_wrapper_script(entrypoints: &[String]) -> String {
    let mut script = String::from("#!/bin/sh\nset -e\n");
    for entrypoint in entrypoints {
        script.push_str(&format!("{}\n", entrypoint));
    }
    script.push_str("exec \"$@\"\n");
    script
}

/// The effective security posture (privileged mode, init, capabilities)
/// once config and Feature-contributed values are merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedSecurityOptions {
    pub privileged: bool,
    pub init: Option<bool>,
    pub cap_add: Vec<String>,
    pub security_opt: Vec<String>,
}

/// Merge security-relevant settings from `config` and `features` into one
/// effective set, reusing [`crate::security::SecurityOptions`] for the
/// privileged/capability merge and layering `init` on top (config wins,
/// else the first feature that sets it).
pub fn merge_security_options(
    config: &crate::config::DevContainerConfig,
    features: &[ResolvedFeature],
) -> MergedSecurityOptions {
    let security = crate::security::SecurityOptions::merge_from_config_and_features(
        config, features,
    );

    let init = config.init.or_else(|| {
        features
            .iter()
            .find_map(|f| f.metadata.init)
    });

    MergedSecurityOptions {
        privileged: security.privileged,
        init,
        cap_add: security.cap_add,
        security_opt: security.security_opt,
    }
}

/// Canonicalize a feature id the way the devcontainer CLI does for local
/// vs. OCI-reference ids: OCI references are lower-cased (registry paths
/// are case-insensitive); local/relative paths are left untouched.
pub fn canonicalize_feature_id(id: &str) -> String {
    if id.starts_with("./") || id.starts_with("../") || id.starts_with('/') {
        id.to_string()
    } else {
        id.to_lowercase()
    }
}

/// Configuration for merging CLI-provided (`--additional-features`) features
/// into a devcontainer.json's own `features` map.
#[derive(Debug, Clone, Default)]
pub struct FeatureMergeConfig {
    additional_features: Option<String>,
    prefer_cli_features: bool,
    install_order_override: Option<Vec<String>>,
    skip_auto_mapping: bool,
}

impl FeatureMergeConfig {
    pub fn new(
        additional_features: Option<String>,
        prefer_cli_features: bool,
        install_order_override: Option<Vec<String>>,
        skip_auto_mapping: bool,
    ) -> Self {
        Self {
            additional_features,
            prefer_cli_features,
            install_order_override,
            skip_auto_mapping,
        }
    }
}

/// Merges CLI-provided features into a config's `features` JSON object.
pub struct FeatureMerger;

impl FeatureMerger {
    /// Merge `base_features` (the devcontainer.json `features` object) with
    /// any `--additional-features` JSON carried on `merge_config`. When a
    /// feature id appears in both, `prefer_cli_features` decides which
    /// options object wins; otherwise the CLI-provided entry is only added
    /// if not already present.
    pub fn merge_features(
        base_features: &serde_json::Value,
        merge_config: &FeatureMergeConfig,
    ) -> Result<serde_json::Value> {
        let mut merged = match base_features {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };

        let Some(additional) = &merge_config.additional_features else {
            return Ok(serde_json::Value::Object(merged));
        };

        if merge_config.skip_auto_mapping {
            return Ok(serde_json::Value::Object(merged));
        }

        let parsed: serde_json::Value =
            serde_json::from_str(additional).map_err(FeatureError::Json)?;
        let additional_map = parsed.as_object().ok_or_else(|| FeatureError::Validation {
            message: "--additional-features must be a JSON object".to_string(),
        })?;

        for (id, value) in additional_map {
            let canonical_id = canonicalize_feature_id(id);
            if merge_config.prefer_cli_features || !merged.contains_key(&canonical_id) {
                merged.insert(canonical_id, value.clone());
            }
        }

        Ok(serde_json::Value::Object(merged))
    }

    /// Compute the effective install order after a merge: the explicit
    /// override carried on `merge_config` wins outright; otherwise the
    /// config's pre-existing order is kept unchanged (`None`).
    pub fn get_effective_install_order(
        current_order: &[String],
        merge_config: &FeatureMergeConfig,
    ) -> Result<Option<Vec<String>>> {
        if let Some(override_order) = &merge_config.install_order_override {
            let mut combined = override_order.clone();
            for id in current_order {
                if !combined.contains(id) {
                    combined.push(id.clone());
                }
            }
            return Ok(Some(combined));
        }

        Ok(None)
    }
}

/// Placeholder for feature system
pub struct Feature;

impl Feature {
    /// Placeholder feature installer
    pub fn install() -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_option_value_conversions() {
        let bool_val = OptionValue::Boolean(true);
        assert_eq!(bool_val.as_bool(), Some(true));
        assert_eq!(bool_val.as_str(), None);

        let string_val = OptionValue::String("test".to_string());
        assert_eq!(string_val.as_bool(), None);
        assert_eq!(string_val.as_str(), Some("test"));
    }

    #[test]
    fn test_feature_option_default_values() {
        let bool_option = FeatureOption::Boolean {
            default: Some(true),
            description: None,
        };
        assert_eq!(
            bool_option.default_value(),
            Some(OptionValue::Boolean(true))
        );

        let string_option = FeatureOption::String {
            default: Some("default_value".to_string()),
            description: None,
            r#enum: None,
            proposals: None,
        };
        assert_eq!(
            string_option.default_value(),
            Some(OptionValue::String("default_value".to_string()))
        );
    }

    #[test]
    fn test_feature_option_validation() {
        let bool_option = FeatureOption::Boolean {
            default: Some(true),
            description: None,
        };
        assert!(bool_option
            .validate_value(&OptionValue::Boolean(false))
            .is_ok());
        assert!(bool_option
            .validate_value(&OptionValue::String("test".to_string()))
            .is_err());

        let enum_option = FeatureOption::String {
            default: None,
            description: None,
            r#enum: Some(vec!["value1".to_string(), "value2".to_string()]),
            proposals: None,
        };
        assert!(enum_option
            .validate_value(&OptionValue::String("value1".to_string()))
            .is_ok());
        assert!(enum_option
            .validate_value(&OptionValue::String("invalid".to_string()))
            .is_err());
    }

    #[test]
    fn test_parse_minimal_feature_metadata() {
        let minimal_feature = r#"
        {
            "id": "test-feature"
        }
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(minimal_feature.as_bytes()).unwrap();

        let metadata = parse_feature_metadata(temp_file.path()).unwrap();
        assert_eq!(metadata.id, "test-feature");
        assert_eq!(metadata.name, None);
        assert_eq!(metadata.options.len(), 0);
        assert!(!metadata.has_lifecycle_commands());
    }

    #[test]
    fn test_parse_feature_with_options() {
        let feature_with_options = r#"
        {
            "id": "test-feature",
            "name": "Test Feature",
            "description": "A test feature",
            "options": {
                "enableFeature": {
                    "type": "boolean",
                    "default": true,
                    "description": "Enable the feature"
                },
                "version": {
                    "type": "string",
                    "enum": ["latest", "stable"],
                    "default": "stable",
                    "description": "Version to install"
                }
            },
            "onCreateCommand": "echo 'Feature installed'"
        }
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(feature_with_options.as_bytes())
            .unwrap();

        let metadata = parse_feature_metadata(temp_file.path()).unwrap();
        assert_eq!(metadata.id, "test-feature");
        assert_eq!(metadata.name, Some("Test Feature".to_string()));
        assert_eq!(metadata.options.len(), 2);
        assert!(metadata.has_lifecycle_commands());

        // Check boolean option
        let enable_option = metadata.options.get("enableFeature").unwrap();
        match enable_option {
            FeatureOption::Boolean { default, .. } => {
                assert_eq!(*default, Some(true));
            }
            _ => panic!("Expected boolean option"),
        }

        // Check string option with enum
        let version_option = metadata.options.get("version").unwrap();
        match version_option {
            FeatureOption::String {
                default, r#enum, ..
            } => {
                assert_eq!(*default, Some("stable".to_string()));
                assert_eq!(r#enum.as_ref().unwrap(), &vec!["latest", "stable"]);
            }
            _ => panic!("Expected string option"),
        }
    }

    #[test]
    fn test_parse_invalid_feature_schema() {
        let invalid_feature = r#"
        {
            "id": "",
            "options": {
                "badOption": {
                    "type": "string",
                    "enum": ["value1", "value2"],
                    "default": "invalid_default"
                }
            }
        }
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_feature.as_bytes()).unwrap();

        let result = parse_feature_metadata(temp_file.path());
        assert!(result.is_err());

        if let Err(crate::errors::CribError::Feature(FeatureError::Validation { message })) =
            result
        {
            assert!(message.contains("Feature id is required"));
        } else {
            panic!("Expected validation error for empty id");
        }
    }

    #[test]
    fn test_parse_nonexistent_file() {
        let result = parse_feature_metadata(Path::new("/nonexistent/path/feature.json"));
        assert!(result.is_err());

        if let Err(crate::errors::CribError::Feature(FeatureError::NotFound { .. })) = result {
            // Expected
        } else {
            panic!("Expected NotFound error");
        }
    }

    #[test]
    fn test_parse_invalid_json() {
        let invalid_json = r#"
        {
            "id": "test-feature",
            "invalid": json
        }
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_json.as_bytes()).unwrap();

        let result = parse_feature_metadata(temp_file.path());
        assert!(result.is_err());

        if let Err(crate::errors::CribError::Feature(FeatureError::Parsing { .. })) = result {
            // Expected
        } else {
            panic!("Expected parsing error for invalid JSON");
        }
    }
}
