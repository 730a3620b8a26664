//! Value validation backend.
//!
//! A set-chain member that stores nothing: it walks the outgoing key set
//! and checks every key carrying a `check/validation` regular expression
//! against its string value. Modifier meta keys tune the match:
//!
//! - `check/validation/ignorecase`: case-insensitive;
//! - `check/validation/line`: anchor the pattern to whole lines;
//! - `check/validation/word`: match any whitespace-separated token of
//!   the value (also anchored);
//! - `check/validation/message`: the error reason on mismatch, replacing
//!   the engine-generated text.
//!
//! The first failing key aborts the chain; the error lands as meta on the
//! parent with the validation error numbers.

use regex::RegexBuilder;

use keytree_core::{Key, KeySet};
use keytree_error::{KeyTreeError, Result, StatusCode};

use crate::diagnostics::{set_error, Diagnostic};

use super::{describes, module_description, Backend, PluginStatus};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Meta name of the validation pattern.
pub const CHECK_META: &str = "check/validation";

/// The validation plugin.
#[derive(Debug, Default)]
pub struct ValidationBackend;

impl ValidationBackend {
    /// Create the validation backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn check_key(&self, key: &Key, parent: &Key) -> Result<()> {
        let Some(pattern) = key.meta_value(CHECK_META) else {
            return Ok(());
        };
        let Ok(value) = key.string().map(|s| s.to_owned()) else {
            // Binary values carry no text to validate.
            return Ok(());
        };
        let ignorecase = key.meta(&format!("{CHECK_META}/ignorecase")).is_some();
        let line = key.meta(&format!("{CHECK_META}/line")).is_some();
        let word = key.meta(&format!("{CHECK_META}/word")).is_some();

        let anchored;
        let effective = if line || word {
            anchored = format!("^{pattern}$");
            &anchored
        } else {
            &pattern
        };
        let regex = RegexBuilder::new(effective)
            .case_insensitive(ignorecase)
            .multi_line(line)
            .build()
            .map_err(|e| {
                let reason = e.to_string();
                set_error(
                    parent,
                    &Diagnostic {
                        code: StatusCode::ValidationSyntax,
                        description: "could not compile validation pattern",
                        module: self.name(),
                        file: file!(),
                        line: line!(),
                        reason: &reason,
                    },
                );
                KeyTreeError::storage(self.name(), reason)
            })?;

        let matched = if word {
            value.split_whitespace().any(|token| regex.is_match(token))
        } else {
            regex.is_match(&value)
        };
        if matched {
            return Ok(());
        }

        let reason = key.meta_value(&format!("{CHECK_META}/message")).map_or_else(
            || format!("value '{value}' of key '{}' does not match '{pattern}'", &*key.name()),
            |message| message,
        );
        set_error(
            parent,
            &Diagnostic {
                code: StatusCode::ValidationFailed,
                description: "key value failed validation",
                module: self.name(),
                file: file!(),
                line: line!(),
                reason: &reason,
            },
        );
        Err(KeyTreeError::storage(self.name(), reason))
    }
}

impl Backend for ValidationBackend {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn get(&mut self, returned: &mut KeySet, parent: &Key) -> Result<PluginStatus> {
        if describes(parent, self.name()) {
            returned.append_all(&module_description(self.name(), VERSION, &["get", "set"])?);
            return Ok(PluginStatus::Changed);
        }
        Ok(PluginStatus::Unchanged)
    }

    fn set(&mut self, returned: &mut KeySet, parent: &Key) -> Result<PluginStatus> {
        returned.rewind();
        while let Some(key) = returned.next() {
            self.check_key(&key, parent)?;
        }
        Ok(PluginStatus::Unchanged)
    }
}
