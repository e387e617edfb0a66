//! Path-to-rule resolution for the file-side watcher.

use std::path::{Path, PathBuf};

use confmirror_core::FileRule;

/// The ordered set of file-side sync rules.
///
/// Resolution is keyed on the *configured* path, not the notified one:
/// a notification for a child of a watched directory resolves to the
/// directory rule, and the rule's data is re-read from the configured path.
/// This also keeps symlink swaps resolvable, since subscriptions are
/// re-armed on the configured path rather than the real path behind it.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<(PathBuf, FileRule)>,
}

impl RuleSet {
    pub fn new(rules: Vec<(PathBuf, FileRule)>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every configured path, in configuration order. Each appears exactly
    /// once; this is the set of watch subscriptions to establish.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.rules.iter().map(|(path, _)| path.as_path())
    }

    /// Resolve a notified path to its governing rule.
    ///
    /// Exact matches win; otherwise the first configured directory rule
    /// whose path is a strict prefix of the notified path applies
    /// (directory rules are non-recursive, so one level is all that can
    /// match in practice). Returns the configured path alongside the rule.
    pub fn resolve(&self, notified: &Path) -> Option<(&Path, &FileRule)> {
        if let Some((path, rule)) = self.rules.iter().find(|(path, _)| path == notified) {
            return Some((path.as_path(), rule));
        }
        self.rules
            .iter()
            .find(|(path, _)| notified.starts_with(path) && notified != path)
            .map(|(path, rule)| (path.as_path(), rule))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use confmirror_core::ResourceKind;

    fn rule(name: &str) -> FileRule {
        FileRule {
            kind: ResourceKind::ConfigMap,
            namespace: "default".to_owned(),
            name: Some(name.to_owned()),
            key: None,
            process: None,
            url: None,
        }
    }

    fn rules(paths: &[&str]) -> RuleSet {
        RuleSet::new(
            paths
                .iter()
                .map(|p| (PathBuf::from(p), rule(p.trim_start_matches('/'))))
                .collect(),
        )
    }

    #[test]
    fn exact_match_wins() {
        let set = rules(&["/etc/app", "/etc/app/config.yaml"]);
        let (path, rule) = set.resolve(Path::new("/etc/app/config.yaml")).expect("hit");
        // The exact file rule beats the enclosing directory rule.
        assert_eq!(path, Path::new("/etc/app/config.yaml"));
        assert_eq!(rule.name.as_deref(), Some("etc/app/config.yaml"));
    }

    #[test]
    fn directory_prefix_matches_children() {
        let set = rules(&["/etc/app"]);
        let (path, _) = set.resolve(Path::new("/etc/app/feature.toml")).expect("hit");
        assert_eq!(path, Path::new("/etc/app"));
    }

    #[test]
    fn overlapping_directory_rules_resolve_to_the_earliest() {
        let set = rules(&["/etc", "/etc/app"]);
        let (path, _) = set.resolve(Path::new("/etc/app/feature.toml")).expect("hit");
        assert_eq!(path, Path::new("/etc"));
    }

    #[test]
    fn unrelated_paths_do_not_resolve() {
        let set = rules(&["/etc/app"]);
        assert!(set.resolve(Path::new("/var/log/app.log")).is_none());
        // Sibling with a shared string prefix but different component.
        assert!(set.resolve(Path::new("/etc/application.conf")).is_none());
    }

    #[test]
    fn configured_paths_are_unique() {
        let set = rules(&["/etc/app", "/etc/other"]);
        let paths: Vec<_> = set.paths().collect();
        assert_eq!(paths.len(), 2);
        let mut deduped = paths.clone();
        deduped.dedup();
        assert_eq!(paths, deduped);
    }
}
