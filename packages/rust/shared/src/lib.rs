//! Shared types, error model, and configuration for livepage.
//!
//! This crate is the foundation depended on by all other livepage crates.
//! It provides:
//! - [`LivePageError`], the unified error type
//! - Content model types ([`Entry`], [`FieldValue`], [`LocalizedEntry`], [`Locale`])
//! - Render output types ([`PageProps`], [`PageMeta`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ContentfulConfig, LiveConfig, PagesConfig, SectionsConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_token,
};
pub use error::{LivePageError, Result};
pub use types::{
    ENTRY_TYPE, Entry, EntryId, EntrySys, FieldValue, Fields, Locale, LocaleQuery,
    LocalizedEntry, PageMeta, PageProps,
};
