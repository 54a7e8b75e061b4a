//! Shared types, error model, and configuration for privaudit.
//!
//! This crate is the foundation depended on by all other privaudit crates.
//! It provides:
//! - [`AuditError`] — the unified error type
//! - Domain types ([`Domain`], [`CookieRecord`], [`CookieTimelineEntry`],
//!   [`UrlCandidate`], [`TargetSelection`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrowserSettings, DefaultsConfig, GeminiConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{AuditError, Result};
pub use types::{CookieRecord, CookieTimelineEntry, Domain, TargetSelection, UrlCandidate};
