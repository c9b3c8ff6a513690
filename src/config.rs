//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\tagsmith\config.toml
//! - macOS: ~/Library/Application Support/tagsmith/config.toml
//! - Linux: ~/.config/tagsmith/config.toml
//!
//! Unknown keys are rejected at load so a typo in the file surfaces as an
//! error instead of silently falling back to a default. Credentials may
//! also be supplied via the `TAGSMITH_ACOUSTID_KEY` and
//! `TAGSMITH_METADATA_TOKEN` environment variables, which take precedence
//! over the file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::organizer::paths;

/// Default folder template: `Artist/Album (Year)`
pub const DEFAULT_FOLDER_TEMPLATE: &str = "{artist}/{album} ({year})";
/// Default file template: `NN - Title`
pub const DEFAULT_FILE_TEMPLATE: &str = "{track:02d} - {title}";
/// Folder for tracks without an album.
pub const SINGLES_FOLDER: &str = "Singles";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// API credentials (keep separate for potential future encryption)
    pub credentials: Credentials,

    /// Library layout settings
    pub library: LibraryConfig,

    /// Pipeline tuning
    pub pipeline: PipelineConfig,
}

/// API credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Credentials {
    /// AcoustID API key for fingerprint lookups
    pub acoustid_api_key: Option<String>,

    /// Optional token for the release metadata service
    pub metadata_token: Option<String>,
}

impl Credentials {
    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("TAGSMITH_ACOUSTID_KEY") {
            if !key.is_empty() {
                self.acoustid_api_key = Some(key);
            }
        }
        if let Ok(token) = std::env::var("TAGSMITH_METADATA_TOKEN") {
            if !token.is_empty() {
                self.metadata_token = Some(token);
            }
        }
        self
    }
}

/// Library layout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibraryConfig {
    /// Root directory for the organized library
    pub library_root: PathBuf,

    /// Directory for pre-modification backups (empty = `library_root/_Backups`)
    pub backup_root: Option<PathBuf>,

    /// Folder structure template ({artist}, {album}, {year})
    pub folder_template: String,

    /// File naming template ({track:02d}, {title})
    pub file_template: String,

    /// Copy originals to the backup root before any mutation
    pub keep_originals: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            library_root: PathBuf::new(),
            backup_root: None,
            folder_template: DEFAULT_FOLDER_TEMPLATE.to_string(),
            file_template: DEFAULT_FILE_TEMPLATE.to_string(),
            keep_originals: true,
        }
    }
}

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Confidence at or above which matches apply automatically (0-100)
    pub auto_apply_threshold: f64,

    /// Confidence at or above which matches are queued for review (0-100)
    pub review_threshold: f64,

    /// Parallel fingerprint workers (0 = half the cores, minimum 2)
    pub worker_count: usize,

    /// Files shorter than this many seconds are treated as short audio
    pub skip_short_duration_seconds: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auto_apply_threshold: 90.0,
            review_threshold: 70.0,
            worker_count: 0,
            skip_short_duration_seconds: 10.0,
        }
    }
}

/// Resolved options for a single batch run.
///
/// Built from [`Config`] plus CLI flags; validated fail-fast before any
/// mutation happens.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub dry_run: bool,
    pub auto_apply_threshold: f64,
    pub review_threshold: f64,
    pub worker_count: usize,
    pub keep_originals: bool,
    pub library_root: PathBuf,
    pub backup_root: PathBuf,
    pub folder_template: String,
    pub file_template: String,
    pub skip_short_duration_seconds: f64,
}

impl BatchOptions {
    /// Build batch options from loaded config.
    pub fn from_config(config: &Config, dry_run: bool) -> Self {
        let library_root = config.library.library_root.clone();
        let backup_root = config
            .library
            .backup_root
            .clone()
            .unwrap_or_else(|| library_root.join("_Backups"));
        Self {
            dry_run,
            auto_apply_threshold: config.pipeline.auto_apply_threshold,
            review_threshold: config.pipeline.review_threshold,
            worker_count: effective_worker_count(config.pipeline.worker_count),
            keep_originals: config.library.keep_originals,
            library_root,
            backup_root,
            folder_template: config.library.folder_template.clone(),
            file_template: config.library.file_template.clone(),
            skip_short_duration_seconds: config.pipeline.skip_short_duration_seconds,
        }
    }

    /// Validate the options before a batch starts.
    ///
    /// Invalid configuration fails fast: no mutations are performed. A
    /// malformed template is not fatal; it logs a warning and falls back
    /// to the default.
    pub fn validate(&mut self) -> Result<()> {
        if !paths::is_safe_library_root(&self.library_root) {
            return Err(Error::config(format!(
                "library root {:?} is too close to the filesystem root",
                self.library_root
            )));
        }
        if !(0.0..=100.0).contains(&self.auto_apply_threshold)
            || !(0.0..=100.0).contains(&self.review_threshold)
        {
            return Err(Error::config("thresholds must be within 0..=100"));
        }
        if self.auto_apply_threshold < self.review_threshold {
            return Err(Error::config(
                "auto_apply_threshold must be >= review_threshold",
            ));
        }
        if self.worker_count == 0 {
            return Err(Error::config("worker_count must be at least 1"));
        }
        if !template_is_valid(&self.folder_template, &["artist", "album", "year"]) {
            tracing::warn!(
                "Folder template {:?} is malformed, falling back to default",
                self.folder_template
            );
            self.folder_template = DEFAULT_FOLDER_TEMPLATE.to_string();
        }
        if !template_is_valid(&self.file_template, &["track:02d", "track", "title"]) {
            tracing::warn!(
                "File template {:?} is malformed, falling back to default",
                self.file_template
            );
            self.file_template = DEFAULT_FILE_TEMPLATE.to_string();
        }
        Ok(())
    }
}

/// Resolve the configured worker count: 0 means half the logical cores,
/// with a floor of 2 so the host stays responsive.
pub fn effective_worker_count(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    cores.div_ceil(2).max(2)
}

/// Check that every `{placeholder}` in a template is a known field.
fn template_is_valid(template: &str, allowed: &[&str]) -> bool {
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            return false; // unbalanced brace
        };
        let name = &rest[start + 1..start + len];
        if !allowed.contains(&name) {
            return false;
        }
        rest = &rest[start + len + 1..];
    }
    !rest.contains('}')
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tagsmith"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk.
///
/// A missing file yields the defaults; a malformed file is an error
/// (unknown keys included) so bad settings never silently run a batch.
pub fn load() -> Result<Config> {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Ok(Config::default());
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(&path)?;
    let mut config: Config = toml::from_str(&contents)
        .map_err(|e| Error::config(format!("failed to parse {:?}: {}", path, e)))?;
    config.credentials = config.credentials.with_env_overrides();
    tracing::info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Save configuration to disk.
///
/// Creates the config directory if it doesn't exist. Writes to a temp
/// file then renames so a crash never leaves a half-written config.
pub fn save(config: &Config) -> Result<()> {
    let dir = config_dir().ok_or_else(|| Error::config("could not determine config directory"))?;
    let path = dir.join("config.toml");

    std::fs::create_dir_all(&dir)?;

    let contents = toml::to_string_pretty(config)
        .map_err(|e| Error::config(format!("failed to serialize config: {}", e)))?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents)?;
    std::fs::rename(&temp_path, &path)?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
