//! Runtime utilities for creating container runtimes from CLI context

use crate::cli::CliContext;
use anyhow::Result;
use crib_core::runtime::{ContainerRuntimeImpl, RuntimeFactory};

/// Create a runtime instance based on CLI context
pub fn create_runtime_from_context(context: &CliContext) -> Result<ContainerRuntimeImpl> {
    let runtime_kind = RuntimeFactory::detect_runtime(context.runtime);
    Ok(RuntimeFactory::create_runtime(runtime_kind)?)
}

/// Create a runtime instance from optional CLI flag
pub fn create_runtime_from_flag(
    runtime_flag: Option<crib_core::runtime::RuntimeKind>,
) -> Result<ContainerRuntimeImpl> {
    let runtime_kind = RuntimeFactory::detect_runtime(runtime_flag);
    Ok(RuntimeFactory::create_runtime(runtime_kind)?)
}
