//! Well-known annotation, label and finalizer keys attached to mirrored
//! objects. These form the on-object lifecycle surface: everything the
//! reconciler decides is derived from these fields plus the deletion flag.

/// Finalizer token that blocks object deletion until cleanup has run.
pub const FINALIZER: &str = "confmirror/finalizer";

/// Annotation opting an object out of mirroring without deleting it.
pub const SKIP_ANNOTATION: &str = "confmirror/skip";

/// Annotation overriding the process-wide default target directory.
pub const TARGET_DIR_ANNOTATION: &str = "confmirror/target-directory";

/// Annotation suppressing file removal during cleanup.
pub const IGNORE_DELETE_ANNOTATION: &str = "confmirror/ignore-delete";
