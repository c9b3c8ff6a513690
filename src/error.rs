//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - Module-specific errors (e.g., [`crate::resolve::OracleError`]) for
//!   detailed handling
//! - All errors implement `std::error::Error` for compatibility

use std::path::PathBuf;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database migration error
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Tag reading/writing error
    #[error("Tag error for {path}: {message}")]
    Tag { path: PathBuf, message: String },

    /// Metadata resolution error
    #[error("Resolution error: {0}")]
    Resolution(#[from] crate::resolve::OracleError),

    /// File organization error
    #[error("Organization error: {0}")]
    Organization(String),

    /// File not found
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a tag error.
    pub fn tag(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Tag {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an organization error.
    pub fn organization(message: impl Into<String>) -> Self {
        Self::Organization(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("/path/to/file.mp3");
        assert!(err.to_string().contains("/path/to/file.mp3"));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::organization("rename failed").context("while applying match");
        let msg = err.to_string();
        assert!(msg.contains("while applying match"));
    }

    #[test]
    fn test_tag_error() {
        let err = Error::tag("/music/song.mp3", "unsupported format");
        let msg = err.to_string();
        assert!(msg.contains("song.mp3"));
        assert!(msg.contains("unsupported format"));
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(Error::organization("test"));
        let with_ctx = result.with_context("additional context");
        assert!(with_ctx
            .unwrap_err()
            .to_string()
            .contains("additional context"));
    }
}
