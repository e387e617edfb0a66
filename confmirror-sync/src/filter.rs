//! The event filter chain in front of the reconciler.
//!
//! Every predicate must pass for an event to be delivered. Deletes always
//! pass. The skip and label predicates are deliberately asymmetric on
//! updates: a transition *into* a disqualifying state is still delivered so
//! cleanup can run, and a transition *out* of it is delivered so a
//! reactivated object is resynced immediately — only events that stay
//! disqualified on both sides are suppressed.

use confmirror_cluster::{KeyValueObject, WatchEvent};
use confmirror_core::markers;
use confmirror_core::parse::Selector;
use confmirror_core::WatcherSettings;

/// The composed filter chain for one watch subscription.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    namespaces: Vec<String>,
    required_label: Option<String>,
    selector: Option<Selector>,
}

impl FilterChain {
    pub fn from_settings(settings: &WatcherSettings) -> Self {
        Self {
            namespaces: settings.namespaces.clone(),
            required_label: settings.required_label.clone(),
            selector: settings.label_selector.clone(),
        }
    }

    /// True when the event should reach the reconciler.
    pub fn allows(&self, event: &WatchEvent) -> bool {
        let object = event.object();
        if !self.namespace_allows(object) || !self.selector_allows(object) {
            return false;
        }
        match event {
            WatchEvent::Deleted(_) => true,
            WatchEvent::Applied { old, new } => {
                changed(old.as_ref(), new)
                    && skip_allows(old.as_ref(), new)
                    && self.label_allows(old.as_ref(), new)
            }
        }
    }

    fn namespace_allows(&self, object: &KeyValueObject) -> bool {
        self.namespaces.is_empty() || self.namespaces.iter().any(|ns| ns == &object.namespace)
    }

    fn selector_allows(&self, object: &KeyValueObject) -> bool {
        self.selector
            .as_ref()
            .map(|s| s.matches(&object.labels))
            .unwrap_or(true)
    }

    fn label_allows(&self, old: Option<&KeyValueObject>, new: &KeyValueObject) -> bool {
        let Some(label) = self.required_label.as_deref() else {
            return true;
        };
        match old {
            // Creates: only objects opted in are interesting — except ones
            // still holding our finalizer (e.g. replayed after a restart
            // that interrupted cleanup), which must reach the reconciler.
            None => new.label_truthy(label) || new.has_finalizer(markers::FINALIZER),
            // Updates: pass while either side is opted in, so the
            // transition out (cleanup) is still observed.
            Some(old) => new.label_truthy(label) || old.label_truthy(label),
        }
    }
}

/// Status-only updates are ignored: an update passes only when the
/// generation, the annotations or the labels changed. Labels count as a
/// change because the required-label and selector predicates act on them;
/// a label-only flip must still reach the transition logic below. Creates
/// always pass.
fn changed(old: Option<&KeyValueObject>, new: &KeyValueObject) -> bool {
    match old {
        None => true,
        Some(old) => {
            old.generation != new.generation
                || old.annotations != new.annotations
                || old.labels != new.labels
        }
    }
}

/// Skip-annotation predicate. Suppresses skipped creates and updates where
/// both the old and the new state are skipped. A skipped create that still
/// carries our finalizer passes anyway: its cleanup is pending.
fn skip_allows(old: Option<&KeyValueObject>, new: &KeyValueObject) -> bool {
    let new_skipped = new.annotation_truthy(markers::SKIP_ANNOTATION);
    match old {
        None => !new_skipped || new.has_finalizer(markers::FINALIZER),
        Some(old) => !new_skipped || !old.annotation_truthy(markers::SKIP_ANNOTATION),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
