//! Error types for the configuration boundary.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading and validating configuration.
/// Every variant is fatal at startup; the process never starts watching
/// with a malformed rule set.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A file rule with none of {object name, process name, URL}.
    #[error("rule for {path} has no resource name, process name or URL")]
    RuleWithoutTarget { path: PathBuf },

    /// A URL rule must name the object it feeds.
    #[error("URL rule for {url} has no resource name")]
    UrlRuleWithoutName { url: String },

    #[error("unsupported resource kind {value:?} (expected configmap or secret)")]
    UnsupportedKind { value: String },

    #[error("invalid signal name: {value:?}")]
    InvalidSignal { value: String },

    #[error("invalid duration: {value:?}")]
    InvalidDuration { value: String },

    #[error("invalid label selector: {value:?}")]
    InvalidSelector { value: String },

    #[error("invalid URL: {value:?}")]
    InvalidUrl { value: String },
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
