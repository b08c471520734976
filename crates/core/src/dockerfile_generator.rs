//! Dockerfile generation for feature installation using BuildKit
//!
//! This module generates Dockerfiles that install DevContainer features during
//! the image build phase using Docker BuildKit's mount capabilities. This approach
//! provides proper layer caching and follows the DevContainer specification.

use crate::build::BuildOptions;
use crate::errors::{FeatureError, Result};
use crate::features::{InstallationPlan, OptionValue, ResolvedFeature};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, instrument};

/// Build context name for feature content source
/// This name is used in both the Dockerfile generation and build arguments
const FEATURE_CONTENT_SOURCE: &str = "dev_containers_feature_content_source";

/// Configuration for Dockerfile generation
#[derive(Debug, Clone)]
pub struct DockerfileConfig {
    /// Base image to extend
    pub base_image: String,
    /// Target stage name
    pub target_stage: String,
    /// Directory where features are downloaded on the host
    pub features_source_dir: String,
}

impl Default for DockerfileConfig {
    fn default() -> Self {
        Self {
            base_image: String::new(),
            target_stage: "dev_containers_target_stage".to_string(),
            features_source_dir: String::new(),
        }
    }
}

/// Generates a Dockerfile for installing features using BuildKit
#[derive(Debug)]
pub struct DockerfileGenerator {
    config: DockerfileConfig,
}

impl DockerfileGenerator {
    /// Create a new Dockerfile generator
    pub fn new(config: DockerfileConfig) -> Self {
        Self { config }
    }

    /// Generate a complete Dockerfile for feature installation
    #[instrument(skip(self, plan))]
    pub fn generate(&self, plan: &InstallationPlan) -> Result<String> {
        debug!(
            "Generating Dockerfile for {} features across {} levels",
            plan.len(),
            plan.levels.len()
        );

        let mut dockerfile = String::new();

        // Build argument for base image
        dockerfile.push_str(&format!(
            "ARG _DEV_CONTAINERS_BASE_IMAGE={}\n\n",
            self.config.base_image
        ));

        // FROM stage
        dockerfile.push_str(&format!(
            "FROM ${{_DEV_CONTAINERS_BASE_IMAGE}} AS {}\n\n",
            self.config.target_stage
        ));

        // Create temporary directory for features
        dockerfile.push_str("RUN mkdir -p /tmp/dev-container-features\n\n");

        // Install features level by level
        for (level_idx, level) in plan.levels.iter().enumerate() {
            dockerfile.push_str(&format!("# Level {}: Installing features\n", level_idx));

            for feature_id in level {
                let feature =
                    plan.get_feature(feature_id)
                        .ok_or_else(|| FeatureError::NotFound {
                            path: format!("Feature {} in installation plan", feature_id),
                        })?;

                dockerfile.push_str(&self.generate_feature_install_command(feature, level_idx)?);
            }

            dockerfile.push('\n');
        }

        Ok(dockerfile)
    }

    /// Generate the RUN command for installing a single feature
    fn generate_feature_install_command(
        &self,
        feature: &ResolvedFeature,
        level_idx: usize,
    ) -> Result<String> {
        let sanitized_id = Self::sanitize_feature_id(&feature.id);
        let feature_dir_name = format!("{}_{}", sanitized_id, level_idx);
        let mount_target = format!("/tmp/build-features-{}/{}", level_idx, feature_dir_name);

        let mut command = String::new();

        // Start RUN command with BuildKit mount
        command.push_str(&format!(
            "RUN --mount=type=bind,from={},source={},target={},rw \\\n",
            FEATURE_CONTENT_SOURCE, feature_dir_name, mount_target
        ));

        // Add environment variables for feature options
        let env_vars = Self::build_environment_variables(feature);
        for (key, value) in env_vars {
            command.push_str(&format!("    {} \\\n", Self::format_env_var(&key, &value)));
        }

        // Execute the install script
        command.push_str(&format!(
            "    cd {} && chmod +x install.sh && ./install.sh\n\n",
            mount_target
        ));

        Ok(command)
    }

    /// Sanitize feature ID for use in file paths
    fn sanitize_feature_id(id: &str) -> String {
        // Replace special characters with underscores
        id.chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Build environment variables from feature options
    fn build_environment_variables(feature: &ResolvedFeature) -> HashMap<String, String> {
        let mut env_vars = HashMap::new();

        for (key, value) in &feature.options {
            // Convert option key to uppercase as per DevContainer spec
            let env_key = key.to_uppercase();
            let env_value = Self::option_value_to_string(value);
            env_vars.insert(env_key, env_value);
        }

        env_vars
    }

    /// Convert OptionValue to string for environment variable
    fn option_value_to_string(value: &OptionValue) -> String {
        match value {
            OptionValue::Boolean(b) => b.to_string(),
            OptionValue::String(s) => s.clone(),
            OptionValue::Number(n) => n.to_string(),
            OptionValue::Array(a) => serde_json::to_string(a).unwrap_or_default(),
            OptionValue::Object(o) => serde_json::to_string(o).unwrap_or_default(),
            OptionValue::Null => String::new(),
        }
    }

    /// Format environment variable for Dockerfile
    fn format_env_var(key: &str, value: &str) -> String {
        // Escape special characters in value
        let escaped_value = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("{}=\"{}\"", key, escaped_value)
    }

    /// Generate build context arguments for docker buildx build command
    ///
    /// When `build_options` is provided and not default, cache arguments are included
    /// in the generated command. This enables cache-from/cache-to/no-cache/builder
    /// options to propagate to feature builds.
    ///
    /// Per spec (data-model.md):
    /// - `cache_from`: ordered list of cache sources, preserved when invoking BuildKit/buildx
    /// - `cache_to`: optional cache destination
    /// - `builder`: optional buildx builder selection
    /// - When `build_options.is_default()` returns true, no extra arguments are added
    pub fn generate_build_args(
        &self,
        dockerfile_path: &Path,
        image_tag: &str,
        build_options: Option<&BuildOptions>,
    ) -> Vec<String> {
        let mut args = vec![
            "buildx".to_string(),
            "build".to_string(),
            "--load".to_string(),
        ];

        // Add cache/builder arguments from BuildOptions if provided and not default
        if let Some(opts) = build_options {
            if !opts.is_default() {
                args.extend(opts.to_docker_args());
            }
        }

        // Add build context and other standard arguments
        args.extend(vec![
            "--build-context".to_string(),
            format!(
                "{}={}",
                FEATURE_CONTENT_SOURCE, self.config.features_source_dir
            ),
            "--build-arg".to_string(),
            format!("_DEV_CONTAINERS_BASE_IMAGE={}", self.config.base_image),
            "--target".to_string(),
            self.config.target_stage.clone(),
            "-f".to_string(),
            dockerfile_path.display().to_string(),
            "-t".to_string(),
            image_tag.to_string(),
            ".".to_string(),
        ]);

        args
    }
}
