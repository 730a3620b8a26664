//! Error and warning meta on parent keys.
//!
//! Facade operations report failures twice: as a returned error and as
//! meta keys on the parent key of the operation, so callers (and tools
//! walking a tree) can inspect what went wrong after the fact.
//!
//! Shape: at most one error per operation under `error/...`; any number of
//! warnings under `warnings/#NN/...` with `NN` wrapping at
//! [`MAX_WARNINGS`]. The `warnings` meta key holds the index of the newest
//! entry. Each entry carries `number`, `description`, `module`, `file`,
//! `line` and `reason`.

use keytree_core::Key;
use keytree_error::StatusCode;
use keytree_types::limits::MAX_WARNINGS;

/// Details of one diagnostic, written as a meta-key group.
#[derive(Debug, Clone, Copy)]
pub struct Diagnostic<'a> {
    /// Numeric code, stored as `number`.
    pub code: StatusCode,
    /// Short generic text for this code, stored as `description`.
    pub description: &'a str,
    /// Reporting module (backend name or `kdb`), stored as `module`.
    pub module: &'a str,
    /// Source location, stored as `file` / `line`.
    pub file: &'a str,
    pub line: u32,
    /// Human-readable cause, stored as `reason`.
    pub reason: &'a str,
}

/// Attach the error meta group to `parent`.
///
/// Only one error fits on a key: if `error` is already present the
/// diagnostic is downgraded to a warning. Best effort; a meta-locked
/// parent swallows diagnostics.
pub fn set_error(parent: &Key, diag: &Diagnostic<'_>) {
    if parent.meta("error").is_some() {
        add_warning(parent, diag);
        return;
    }
    let _ = parent.set_meta("error", Some(diag.reason));
    write_group(parent, "error", diag);
}

/// Append an indexed warning meta group to `parent`.
pub fn add_warning(parent: &Key, diag: &Diagnostic<'_>) {
    let index = parent
        .meta_value("warnings")
        .and_then(|v| v.parse::<u32>().ok())
        .map_or(0, |last| (last + 1) % MAX_WARNINGS);
    let _ = parent.set_meta("warnings", Some(index.to_string().as_str()));
    write_group(parent, &format!("warnings/#{index:02}"), diag);
}

/// Whether `parent` carries an error meta group.
#[must_use]
pub fn has_error(parent: &Key) -> bool {
    parent.meta("error").is_some()
}

fn write_group(parent: &Key, prefix: &str, diag: &Diagnostic<'_>) {
    let code = diag.code as i32;
    let _ = parent.set_meta(&format!("{prefix}/number"), Some(code.to_string().as_str()));
    let _ = parent.set_meta(&format!("{prefix}/description"), Some(diag.description));
    let _ = parent.set_meta(&format!("{prefix}/module"), Some(diag.module));
    let _ = parent.set_meta(&format!("{prefix}/file"), Some(diag.file));
    let _ = parent.set_meta(&format!("{prefix}/line"), Some(diag.line.to_string().as_str()));
    let _ = parent.set_meta(&format!("{prefix}/reason"), Some(diag.reason));
}
