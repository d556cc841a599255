//! Rich diagnostic error types for the almanac engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so embedders know exactly what went wrong
//! and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the almanac engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source chains) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum AlmanacError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("version not found: {id}")]
    #[diagnostic(
        code(almanac::store::not_found),
        help(
            "The store has never saved a version with this identifier. \
             `set_active` only accepts identifiers of previously saved versions — \
             check the id, or save the version first."
        )
    )]
    VersionNotFound { id: String },

    #[error("I/O error: {source}")]
    #[diagnostic(
        code(almanac::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(almanac::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption — try running against a fresh data \
             directory. If the problem persists, file a bug report."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(almanac::store::serde),
        help(
            "Failed to serialize or deserialize a stored version. \
             This usually means the on-disk format changed between releases — \
             republish from a fresh data directory."
        )
    )]
    Serialization { message: String },

    #[error("non-monotonic write: version number {number} is not above head {head}")]
    #[diagnostic(
        code(almanac::store::non_monotonic),
        help(
            "A persistent store only accepts strictly increasing version numbers. \
             A second writer has published since this draft was built — rebuild \
             the draft from the current active version and publish again."
        )
    )]
    NonMonotonicWrite { number: u32, head: u32 },
}

// ---------------------------------------------------------------------------
// Publication errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PublishError {
    #[error("cannot publish a rejected draft ({domain})")]
    #[diagnostic(
        code(almanac::publish::rejected_draft),
        help(
            "The draft was rejected during review and can never be published. \
             Build a fresh draft from the active version and submit it for \
             review again."
        )
    )]
    RejectedDraft { domain: &'static str },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("merge threshold {value} is outside [0, 1]")]
    #[diagnostic(
        code(almanac::config::invalid_threshold),
        help(
            "The scenario merge threshold is a cosine similarity and must lie \
             in [0, 1]. The default is 0.8."
        )
    )]
    InvalidThreshold { value: f64 },

    #[error("minimum override frequency must be at least 1")]
    #[diagnostic(
        code(almanac::config::invalid_frequency),
        help(
            "`min_override_frequency` gates how often a correction must recur \
             before it becomes a mapping entry. Zero would promote every \
             stray override — use 1 to promote singletons deliberately."
        )
    )]
    InvalidFrequency,

    #[error("config parse error: {message}")]
    #[diagnostic(
        code(almanac::config::parse),
        help("The TOML could not be parsed. Check the syntax against the documented fields.")
    )]
    Parse { message: String },
}

/// Convenience alias for functions returning almanac results.
pub type AlmanacResult<T> = std::result::Result<T, AlmanacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_to_almanac_error() {
        let err = StoreError::VersionNotFound { id: "mapping-v9".into() };
        let top: AlmanacError = err.into();
        assert!(matches!(top, AlmanacError::Store(StoreError::VersionNotFound { .. })));
    }

    #[test]
    fn publish_error_wraps_store_error() {
        let err = StoreError::NonMonotonicWrite { number: 2, head: 5 };
        let publish: PublishError = err.into();
        assert!(matches!(publish, PublishError::Store(StoreError::NonMonotonicWrite { .. })));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = StoreError::NonMonotonicWrite { number: 2, head: 5 };
        let msg = format!("{err}");
        assert!(msg.contains('2'));
        assert!(msg.contains('5'));

        let err = PublishError::RejectedDraft { domain: "mapping" };
        assert!(format!("{err}").contains("rejected"));
    }
}
