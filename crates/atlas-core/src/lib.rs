//! Core types, configuration, and error handling for Atlas.
//!
//! This crate provides the shared foundation used by the other Atlas crates:
//! - [`AtlasError`]: unified error type using `thiserror`
//! - [`AtlasConfig`]: configuration loaded from `.atlas.toml`
//! - Shared types: [`RefreshPolicy`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{AtlasConfig, MapConfig, RenderConfig, WalkConfig};
pub use error::AtlasError;
pub use types::{OutputFormat, RefreshPolicy};

/// A convenience `Result` type for Atlas operations.
pub type Result<T> = std::result::Result<T, AtlasError>;
