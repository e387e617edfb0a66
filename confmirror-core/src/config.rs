//! Configuration loading, defaulting and validation.
//!
//! [`ConfigFile`] is the raw serde shape of `confmirror.yaml`; calling
//! [`ConfigFile::validated`] produces the typed [`Config`] consumed by the
//! engine. All string coercion happens here, all invariants are enforced
//! here, and a malformed rule set is fatal before any watch is established.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{io_err, ConfigError};
use crate::parse::{parse_duration, parse_signal, Selector};
use crate::types::{ResourceKind, Signal};

/// Fallback key for URL rules whose path has no usable basename.
pub const DEFAULT_URL_KEY: &str = "config";

/// Default poll interval for URL rules.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

const IN_CLUSTER_NAMESPACE_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

// ---------------------------------------------------------------------------
// Raw (serde) shapes
// ---------------------------------------------------------------------------

/// Raw `confmirror.yaml` document, prior to validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Watched path → mirroring rule. Order is significant: overlapping
    /// directory rules resolve to the earliest entry.
    #[serde(default)]
    pub files: IndexMap<PathBuf, RawFileRule>,
    /// Polled URL → mirroring rule.
    #[serde(default)]
    pub urls: IndexMap<String, RawUrlRule>,
    #[serde(default)]
    pub watcher: RawWatcherSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawFileRule {
    /// Resource kind, `configmap` (default) or `secret`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    /// Overrides the data key for single-file rules.
    pub key: Option<String>,
    /// Process to signal when the path changes.
    pub process: Option<String>,
    /// Signal name or number, default SIGHUP.
    pub signal: Option<String>,
    /// URL to POST the file contents to when the path changes.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawUrlRule {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub key: Option<String>,
    /// Poll interval, e.g. `"30s"`. Default one minute.
    pub interval: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWatcherSettings {
    #[serde(default)]
    pub configmaps: bool,
    #[serde(default)]
    pub secrets: bool,
    /// Comma-separated namespace allow-list. Empty means the default
    /// namespace only.
    pub namespaces: Option<String>,
    /// Label name that objects must carry (with a truthy value) to be
    /// mirrored. Unset disables the label gate.
    pub required_label: Option<String>,
    /// Equality-based label selector expression.
    pub label_selector: Option<String>,
    /// Default directory where object data is materialized.
    pub default_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Typed configuration
// ---------------------------------------------------------------------------

/// Process to signal when a watched path changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTarget {
    pub name: String,
    pub signal: Signal,
}

/// A validated file-side sync rule.
///
/// Invariant (enforced at load): at least one of `name`, `process`, `url`
/// is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRule {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: Option<String>,
    pub key: Option<String>,
    pub process: Option<ProcessTarget>,
    pub url: Option<String>,
}

/// A validated URL polling rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRule {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
    pub key: String,
    pub interval: Duration,
}

/// Validated resource-watcher settings.
#[derive(Debug, Clone, Default)]
pub struct WatcherSettings {
    pub configmaps: bool,
    pub secrets: bool,
    pub namespaces: Vec<String>,
    pub required_label: Option<String>,
    pub label_selector: Option<Selector>,
    pub default_path: PathBuf,
}

/// The fully validated configuration handed to the engine.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Ordered: resolution ties break to the earliest rule.
    pub files: Vec<(PathBuf, FileRule)>,
    pub urls: Vec<(String, UrlRule)>,
    pub watcher: WatcherSettings,
}

impl ConfigFile {
    /// Load a raw config document from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Find and load the config file: an explicit path if given, otherwise
    /// `confmirror.yaml` in the current directory, the home directory or
    /// `/etc/confmirror`. A missing file yields the empty config.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let mut candidates = vec![PathBuf::from("confmirror.yaml")];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join("confmirror.yaml"));
        }
        candidates.push(PathBuf::from("/etc/confmirror/confmirror.yaml"));
        for candidate in candidates {
            if candidate.exists() {
                return Self::load(&candidate);
            }
        }
        Ok(Self::default())
    }

    /// Validate and default the raw document into a typed [`Config`].
    ///
    /// `default_namespace` fills in rules that do not name one.
    pub fn validated(self, default_namespace: &str) -> Result<Config, ConfigError> {
        let mut files = Vec::with_capacity(self.files.len());
        for (path, raw) in self.files {
            let rule = raw.validated(&path, default_namespace)?;
            files.push((path, rule));
        }

        let mut urls = Vec::with_capacity(self.urls.len());
        for (url, raw) in self.urls {
            let rule = raw.validated(&url, default_namespace)?;
            urls.push((url, rule));
        }

        let watcher = self.watcher.validated(default_namespace)?;

        Ok(Config {
            files,
            urls,
            watcher,
        })
    }
}

impl RawFileRule {
    fn validated(self, path: &Path, default_namespace: &str) -> Result<FileRule, ConfigError> {
        if self.name.is_none() && self.process.is_none() && self.url.is_none() {
            return Err(ConfigError::RuleWithoutTarget {
                path: path.to_path_buf(),
            });
        }

        let kind = match self.kind.as_deref() {
            Some(value) => value.parse()?,
            None => ResourceKind::ConfigMap,
        };
        let process = match self.process {
            Some(name) => Some(ProcessTarget {
                name,
                signal: parse_signal(self.signal.as_deref().unwrap_or(""))?,
            }),
            None => None,
        };

        Ok(FileRule {
            kind,
            namespace: self
                .namespace
                .unwrap_or_else(|| default_namespace.to_owned()),
            name: self.name,
            key: self.key,
            process,
            url: self.url,
        })
    }
}

impl RawUrlRule {
    fn validated(self, url: &str, default_namespace: &str) -> Result<UrlRule, ConfigError> {
        let name = self.name.ok_or_else(|| ConfigError::UrlRuleWithoutName {
            url: url.to_owned(),
        })?;

        let kind = match self.kind.as_deref() {
            Some(value) => value.parse()?,
            None => ResourceKind::ConfigMap,
        };
        let interval = match self.interval.as_deref() {
            Some(value) => parse_duration(value)?,
            None => DEFAULT_POLL_INTERVAL,
        };
        let key = match self.key {
            Some(key) => key,
            None => derive_url_key(url)?,
        };

        Ok(UrlRule {
            kind,
            namespace: self
                .namespace
                .unwrap_or_else(|| default_namespace.to_owned()),
            name,
            key,
            interval,
        })
    }
}

impl RawWatcherSettings {
    fn validated(self, default_namespace: &str) -> Result<WatcherSettings, ConfigError> {
        let namespaces = match self.namespaces.as_deref() {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .map(str::to_owned)
                .collect(),
            None => vec![default_namespace.to_owned()],
        };
        let label_selector = match self.label_selector.as_deref() {
            Some(expr) => {
                let selector = Selector::parse(expr)?;
                (!selector.is_empty()).then_some(selector)
            }
            None => None,
        };

        Ok(WatcherSettings {
            configmaps: self.configmaps,
            secrets: self.secrets,
            namespaces,
            required_label: self.required_label.filter(|l| !l.is_empty()),
            label_selector,
            default_path: self.default_path.unwrap_or_else(|| PathBuf::from("/tmp")),
        })
    }
}

/// Derive a URL rule's data key from the last path segment of its URL,
/// falling back to [`DEFAULT_URL_KEY`].
fn derive_url_key(url: &str) -> Result<String, ConfigError> {
    let without_scheme = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| ConfigError::InvalidUrl {
            value: url.to_owned(),
        })?;
    let path = without_scheme
        .split_once('/')
        .map(|(_, path)| path)
        .unwrap_or("");
    let base = path
        .split(['?', '#'])
        .next()
        .unwrap_or("")
        .rsplit('/')
        .next()
        .unwrap_or("");
    if base.is_empty() || base == "." {
        Ok(DEFAULT_URL_KEY.to_owned())
    } else {
        Ok(base.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Default namespace discovery
// ---------------------------------------------------------------------------

/// Resolve the process-wide default namespace: the `POD_NAMESPACE`
/// environment variable, else the in-cluster serviceaccount namespace file,
/// else `"default"`.
pub fn default_namespace() -> String {
    namespace_from(
        std::env::var("POD_NAMESPACE").ok(),
        Path::new(IN_CLUSTER_NAMESPACE_PATH),
    )
}

fn namespace_from(env_value: Option<String>, namespace_file: &Path) -> String {
    if let Some(ns) = env_value.filter(|ns| !ns.is_empty()) {
        return ns;
    }
    if let Ok(contents) = std::fs::read_to_string(namespace_file) {
        let trimmed = contents.trim();
        if !trimmed.is_empty() {
            return trimmed.to_owned();
        }
    }
    "default".to_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
