//! OCI registry integration for DevContainer features
//!
//! This module implements OCI registry v2 support with authentication for fetching
//! and installing DevContainer features. It supports authentication via environment
//! variables, Docker credential helpers, custom CA certificates, and proxy configuration.
//!
//! ## Core Capabilities
//!
//! - **Feature and Template Operations**: Fetch, install, and publish features and templates
//! - **Tag Listing**: Query available tags from registries (`list_tags`)
//! - **Manifest Operations**: Fetch manifests by tag or digest (`get_manifest`, `get_manifest_by_digest`)
//! - **Multi-Tag Publishing**: Publish artifacts with multiple tags in one operation (`publish_feature_multi_tag`)
//! - **Collection Metadata**: Support for devcontainer-collection.json structure
//! - **Semantic Versioning**: Parse, filter, sort, and compute semantic version tags (`semver_utils` module)
//!
//! ## Authentication
//!
//! Supports multiple authentication methods with the following precedence order:
//!
//! 1. **Environment Variables** (highest priority):
//!    - `CRIB_REGISTRY_TOKEN`: Bearer token authentication
//!    - `CRIB_REGISTRY_USER` + `CRIB_REGISTRY_PASS`: Basic authentication
//! 2. **Docker config.json**: Credentials from `~/.docker/config.json`
//! 3. **No authentication**: Fallback for public registries
//!
//! Custom CA certificates can be configured via:
//! - `CRIB_CUSTOM_CA_BUNDLE`: Path to a PEM-encoded CA certificate bundle
//!
//! ## Semantic Version Utilities
//!
//! The `semver_utils` module provides utilities for working with semantic versions:
//! - Parse versions from tags (handles "v1.2.3", "1.2.3", "1.2", "1" formats)
//! - Filter tags to only semantic versions
//! - Sort tags in semantic version order
//! - Compute semantic tags (e.g., "1.2.3" → ["1", "1.2", "1.2.3", "latest"])
//! - Compare versions

mod auth;
mod client;
mod fetcher;
mod types;
mod utils;

// Re-export public types
pub use auth::{RegistryAuth, RegistryCredentials};
pub use client::{HttpClient, MockHttpClient, ReqwestClient};
pub use fetcher::{default_fetcher, default_fetcher_with_config, FeatureFetcher};
pub use types::{
    CollectionFeature, CollectionMetadata, CollectionSourceInfo, CollectionTemplate,
    DownloadedFeature, DownloadedTemplate, FeatureRef, HttpResponse, Layer, Manifest,
    PublishResult, TagList, TemplateRef,
};
pub use utils::{canonical_id, get_features_cache_dir};

// Re-export semver_utils for backwards compatibility with oci::semver_utils path
pub use crate::semver_utils;
