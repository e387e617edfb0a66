//! The per-object lifecycle state machine.
//!
//! The phase is derived purely from observed fields (deletion flag, skip
//! annotation, required label, finalizer presence) so the transition logic
//! is testable without a cluster. The reconciler acts on the derived phase:
//! `Tracked` materializes, `CleaningUp` removes artifacts and drops the
//! finalizer, `Untracked` is a no-op.

use confmirror_cluster::KeyValueObject;
use confmirror_core::markers;

/// Where an object stands in its mirroring lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Not mirrored and nothing to clean up.
    Untracked,
    /// Mirrored: data should be materialized on disk.
    Tracked,
    /// Disqualified (deleted, skipped, or label withdrawn) while still
    /// holding our finalizer: cleanup must run.
    CleaningUp,
}

/// Derive the lifecycle phase for an observed object.
pub fn phase(object: &KeyValueObject, required_label: Option<&str>) -> LifecyclePhase {
    if disqualified(object, required_label) {
        if object.has_finalizer(markers::FINALIZER) {
            LifecyclePhase::CleaningUp
        } else {
            LifecyclePhase::Untracked
        }
    } else {
        LifecyclePhase::Tracked
    }
}

/// True when the object should not (or no longer) be mirrored: deletion
/// requested, skip annotation truthy, or the configured required label
/// absent or falsy.
fn disqualified(object: &KeyValueObject, required_label: Option<&str>) -> bool {
    if object.deletion_requested {
        return true;
    }
    if object.annotation_truthy(markers::SKIP_ANNOTATION) {
        return true;
    }
    match required_label {
        Some(label) => !object.label_truthy(label),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use confmirror_core::ResourceKind;

    fn object() -> KeyValueObject {
        KeyValueObject::new(ResourceKind::ConfigMap, "default", "app-config")
    }

    #[test]
    fn plain_object_is_tracked() {
        assert_eq!(phase(&object(), None), LifecyclePhase::Tracked);
    }

    #[test]
    fn deletion_moves_to_cleanup_only_with_finalizer() {
        let mut obj = object();
        obj.deletion_requested = true;
        assert_eq!(phase(&obj, None), LifecyclePhase::Untracked);

        obj.add_finalizer(markers::FINALIZER);
        assert_eq!(phase(&obj, None), LifecyclePhase::CleaningUp);
    }

    #[test]
    fn skip_annotation_disqualifies() {
        let mut obj = object();
        obj.annotations
            .insert(markers::SKIP_ANNOTATION.to_owned(), "true".to_owned());
        assert_eq!(phase(&obj, None), LifecyclePhase::Untracked);

        obj.add_finalizer(markers::FINALIZER);
        assert_eq!(phase(&obj, None), LifecyclePhase::CleaningUp);

        // An unparsable value is false: still tracked.
        obj.annotations
            .insert(markers::SKIP_ANNOTATION.to_owned(), "maybe".to_owned());
        assert_eq!(phase(&obj, None), LifecyclePhase::Tracked);
    }

    #[test]
    fn required_label_gates_tracking_only_when_configured() {
        let obj = object();
        assert_eq!(phase(&obj, None), LifecyclePhase::Tracked);
        assert_eq!(phase(&obj, Some("mirror")), LifecyclePhase::Untracked);

        let mut labeled = object();
        labeled
            .labels
            .insert("mirror".to_owned(), "true".to_owned());
        assert_eq!(phase(&labeled, Some("mirror")), LifecyclePhase::Tracked);

        labeled
            .labels
            .insert("mirror".to_owned(), "false".to_owned());
        labeled.add_finalizer(markers::FINALIZER);
        assert_eq!(phase(&labeled, Some("mirror")), LifecyclePhase::CleaningUp);
    }
}
