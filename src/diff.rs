//! Commit previews.
//!
//! A preview pairs a module's original text with the text a commit would
//! install, without arbitrating or touching the session's status.

use serde::Serialize;
use similar::{ChangeTag, TextDiff};

use crate::host::ModuleId;

/// Rendered-but-not-committed text for one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDiff {
    pub module: ModuleId,
    pub original: String,
    pub rewritten: String,
}

impl ModuleDiff {
    /// Whether the rewrite changes the module at all.
    pub fn is_changed(&self) -> bool {
        self.original != self.rewritten
    }

    /// A line-oriented unified diff of the pending rewrite.
    pub fn unified(&self) -> String {
        let diff = TextDiff::from_lines(self.original.as_str(), self.rewritten.as_str());
        let mut out = String::new();

        for change in diff.iter_all_changes() {
            let sign = match change.tag() {
                ChangeTag::Delete => '-',
                ChangeTag::Insert => '+',
                ChangeTag::Equal => ' ',
            };
            out.push(sign);
            out.push_str(change.value());
            if change.missing_newline() {
                out.push('\n');
            }
        }

        out
    }
}
