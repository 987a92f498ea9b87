//! Application configuration for livepage.
//!
//! User config lives at `~/.livepage/livepage.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LivePageError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "livepage.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".livepage";

// ---------------------------------------------------------------------------
// Config structs (matching livepage.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Content store connection settings.
    #[serde(default)]
    pub contentful: ContentfulConfig,

    /// Page mapping rules.
    #[serde(default)]
    pub pages: PagesConfig,

    /// Section normalization settings.
    #[serde(default)]
    pub sections: SectionsConfig,

    /// Live preview reconciliation settings.
    #[serde(default)]
    pub live: LiveConfig,
}

/// `[contentful]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentfulConfig {
    /// Space identifier.
    #[serde(default)]
    pub space_id: String,

    /// Default environment when none is given on the command line.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Base URL of the delivery API.
    #[serde(default = "default_host")]
    pub host: String,

    /// Base URL of the preview API (serves unpublished drafts).
    #[serde(default = "default_preview_host")]
    pub preview_host: String,

    /// Name of the env var holding the delivery token (never store the token itself).
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Name of the env var holding the preview token.
    #[serde(default = "default_preview_access_token_env")]
    pub preview_access_token_env: String,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Levels of linked entries the store resolves inline (`include` param).
    #[serde(default = "default_include_depth")]
    pub include_depth: u8,
}

impl Default for ContentfulConfig {
    fn default() -> Self {
        Self {
            space_id: String::new(),
            environment: default_environment(),
            host: default_host(),
            preview_host: default_preview_host(),
            access_token_env: default_access_token_env(),
            preview_access_token_env: default_preview_access_token_env(),
            timeout_secs: default_timeout_secs(),
            include_depth: default_include_depth(),
        }
    }
}

fn default_environment() -> String {
    "master".into()
}
fn default_host() -> String {
    "https://cdn.contentful.com".into()
}
fn default_preview_host() -> String {
    "https://preview.contentful.com".into()
}
fn default_access_token_env() -> String {
    "CONTENTFUL_ACCESS_TOKEN".into()
}
fn default_preview_access_token_env() -> String {
    "CONTENTFUL_PREVIEW_ACCESS_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_include_depth() -> u8 {
    10
}

/// `[pages]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagesConfig {
    /// Content type ids that map to a static page.
    #[serde(default = "default_static_page_models")]
    pub static_page_models: Vec<String>,

    /// Path served by the home page pipeline; never mapped here.
    #[serde(default = "default_home_path")]
    pub home_path: String,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            static_page_models: default_static_page_models(),
            home_path: default_home_path(),
        }
    }
}

fn default_static_page_models() -> Vec<String> {
    vec![
        // customStaticPage
        "customStaticPage".into(),
        // cityPage
        "2od8TlD24wIUuaS02qE6q4".into(),
        // seoPage
        "52n1Q7s5yEk46Ie0mI0ew4".into(),
    ]
}
fn default_home_path() -> String {
    "/home".into()
}

/// `[sections]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionsConfig {
    /// Raw content type id → logical section name. Unlisted ids pass through.
    #[serde(default = "default_aliases")]
    pub aliases: BTreeMap<String, String>,
}

impl Default for SectionsConfig {
    fn default() -> Self {
        Self {
            aliases: default_aliases(),
        }
    }
}

fn default_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([("spHeadingComponent".to_string(), "Heading".to_string())])
}

/// `[live]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Maximum entry nesting rebuilt during reconciliation.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

fn default_max_depth() -> usize {
    64
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.livepage/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LivePageError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.livepage/livepage.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LivePageError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LivePageError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LivePageError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LivePageError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LivePageError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the access token for the delivery or preview API from its env var.
pub fn resolve_token(config: &ContentfulConfig, preview: bool) -> Result<String> {
    let var_name = if preview {
        &config.preview_access_token_env
    } else {
        &config.access_token_env
    };
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(LivePageError::config(format!(
            "content store access token not found. Set the {var_name} environment variable."
        ))),
    }
}
