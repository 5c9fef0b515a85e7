//! Shared types, error model, and configuration for colgen.
//!
//! This crate is the foundation depended on by all other colgen crates.
//! It provides:
//! - [`ColgenError`] / [`ProviderError`]: the unified error types
//! - Domain types ([`Dataset`], [`RowView`], [`RunId`])
//! - Configuration ([`AppConfig`], [`RunConfig`], [`ProviderConfig`], config loading)
//! - The blood-pressure prompt policy shared by the provider and sanitizer

pub mod clinical;
pub mod config;
pub mod dataset;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendKind, FailurePolicy, MAX_WORKERS, MIN_WORKERS, ProviderConfig,
    ProviderSection, RunConfig, RunSection, TemplatesSection, config_dir, config_file_path,
    init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{ColgenError, ProviderError, Result};
pub use types::{Dataset, RowView, RunId};
