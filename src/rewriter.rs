//! Edit accumulation and rendering against one token buffer.
//!
//! A [`Rewriter`] records pending [`EditOp`]s and renders them into a new
//! text on demand. Recording never mutates the underlying buffer and
//! rendering never consumes the recorded edits, so `render()` can be
//! called repeatedly (previews, retries) with identical results.
//!
//! Range edits are validated eagerly against the buffer bounds; overlap
//! between range edits is only detectable once all edits are known, so it
//! is checked at render time. This lets callers queue edits in any order.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;

use crate::buffer::TokenBuffer;

/// Name of one independent edit stream on a buffer.
///
/// Most callers use the default program; named programs let independent
/// concerns accumulate edits against the same buffer without observing
/// each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProgramName(Arc<str>);

impl ProgramName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProgramName {
    fn default() -> Self {
        Self::new("default")
    }
}

impl fmt::Display for ProgramName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One recorded edit against a token buffer.
///
/// A closed set; all rendering flows through a single routine. `Remove`
/// renders as a replacement with empty text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Insert `text` immediately before the token at `index`.
    InsertBefore { index: usize, text: String },
    /// Insert `text` immediately after the token at `index`.
    InsertAfter { index: usize, text: String },
    /// Replace tokens `start..=end` with `text`.
    Replace {
        start: usize,
        end: usize,
        text: String,
    },
    /// Remove tokens `start..=end`.
    Remove { start: usize, end: usize },
}

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("token range [{start}, {end}] out of bounds for buffer of {len} tokens")]
    OutOfRange {
        start: usize,
        end: usize,
        len: usize,
    },

    #[error(
        "conflicting edits: replace [{left_start}, {left_end}] \
         overlaps replace [{right_start}, {right_end}]"
    )]
    ConflictingEdits {
        left_start: usize,
        left_end: usize,
        right_start: usize,
        right_end: usize,
    },
}

/// Accumulator of pending edits against one token buffer.
///
/// Cheap to clone: clones share the same edit list, so a handle checked
/// out from a session and a copy kept by the session render identically.
#[derive(Clone)]
pub struct Rewriter {
    inner: Arc<RewriterInner>,
}

struct RewriterInner {
    buffer: Arc<TokenBuffer>,
    ops: Mutex<Vec<EditOp>>,
}

impl Rewriter {
    /// Create a standalone rewriter over a buffer.
    ///
    /// Callers normally obtain rewriters through a session so their edits
    /// participate in commit arbitration; a standalone rewriter only ever
    /// renders.
    pub fn new(buffer: Arc<TokenBuffer>) -> Self {
        Self {
            inner: Arc::new(RewriterInner {
                buffer,
                ops: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The buffer this rewriter was created against.
    pub fn buffer(&self) -> &TokenBuffer {
        &self.inner.buffer
    }

    /// Record an insertion immediately before the token at `index`.
    ///
    /// Repeated insertions at the same index land with the first call
    /// nearest the token.
    pub fn insert_before(&self, index: usize, text: impl Into<String>) -> Result<(), RewriteError> {
        self.inner.buffer.check_index(index)?;
        self.push(EditOp::InsertBefore {
            index,
            text: text.into(),
        });
        Ok(())
    }

    /// Record an insertion immediately after the token at `index`.
    ///
    /// Repeated insertions at the same index land with the first call
    /// nearest the token.
    pub fn insert_after(&self, index: usize, text: impl Into<String>) -> Result<(), RewriteError> {
        self.inner.buffer.check_index(index)?;
        self.push(EditOp::InsertAfter {
            index,
            text: text.into(),
        });
        Ok(())
    }

    /// Record a replacement of tokens `start..=end` with `text`.
    ///
    /// Ranges from the same rewriter must be mutually disjoint; overlap is
    /// reported by [`render`](Self::render), not here.
    pub fn replace(
        &self,
        start: usize,
        end: usize,
        text: impl Into<String>,
    ) -> Result<(), RewriteError> {
        self.inner.buffer.check_range(start, end)?;
        self.push(EditOp::Replace {
            start,
            end,
            text: text.into(),
        });
        Ok(())
    }

    /// Record a removal of tokens `start..=end`.
    pub fn remove(&self, start: usize, end: usize) -> Result<(), RewriteError> {
        self.inner.buffer.check_range(start, end)?;
        self.push(EditOp::Remove { start, end });
        Ok(())
    }

    /// Whether any edits have been recorded.
    pub fn has_edits(&self) -> bool {
        !self.ops().is_empty()
    }

    /// The buffer's unmodified text.
    pub fn original_text(&self) -> String {
        self.inner.buffer.original_text()
    }

    /// The buffer's unmodified text over tokens `start..=end`.
    pub fn text_between(&self, start: usize, end: usize) -> Result<String, RewriteError> {
        self.inner.buffer.text_between(start, end)
    }

    /// Render the rewritten text.
    ///
    /// Scans tokens in order; at each index emits pending insert-before
    /// text, then the token's original text (or a covering replacement,
    /// exactly once, at the first covered index), then pending
    /// insert-after text. An insert-after on token `i` therefore always
    /// lands before an insert-before on token `i + 1`.
    ///
    /// Fails with [`RewriteError::ConflictingEdits`] if two replace ranges
    /// share a token index. Side-effect-free and idempotent.
    pub fn render(&self) -> Result<String, RewriteError> {
        let ops = self.ops();
        let buffer = &self.inner.buffer;

        let mut before: HashMap<usize, Vec<&str>> = HashMap::new();
        let mut after: HashMap<usize, Vec<&str>> = HashMap::new();
        let mut ranges: Vec<(usize, usize, &str)> = Vec::new();

        for op in &ops {
            match op {
                EditOp::InsertBefore { index, text } => {
                    before.entry(*index).or_default().push(text.as_str());
                }
                EditOp::InsertAfter { index, text } => {
                    after.entry(*index).or_default().push(text.as_str());
                }
                EditOp::Replace { start, end, text } => {
                    ranges.push((*start, *end, text.as_str()));
                }
                EditOp::Remove { start, end } => {
                    ranges.push((*start, *end, ""));
                }
            }
        }

        ranges.sort_by_key(|&(start, end, _)| (start, end));
        for pair in ranges.windows(2) {
            let (left, right) = (pair[0], pair[1]);
            if left.1 >= right.0 {
                return Err(RewriteError::ConflictingEdits {
                    left_start: left.0,
                    left_end: left.1,
                    right_start: right.0,
                    right_end: right.1,
                });
            }
        }

        let mut out = String::new();
        let mut next_range = 0;
        let mut covered_until = None;

        for (index, token) in buffer.tokens().iter().enumerate() {
            if let Some(texts) = before.get(&index) {
                // first call nearest the token
                for text in texts.iter().rev() {
                    out.push_str(text);
                }
            }

            match covered_until {
                Some(end) if index <= end => {}
                _ => {
                    if next_range < ranges.len() && ranges[next_range].0 == index {
                        let (_, end, text) = ranges[next_range];
                        out.push_str(text);
                        covered_until = Some(end);
                        next_range += 1;
                    } else {
                        out.push_str(&token.text);
                    }
                }
            }

            if let Some(texts) = after.get(&index) {
                for text in texts {
                    out.push_str(text);
                }
            }
        }

        Ok(out)
    }

    fn push(&self, op: EditOp) {
        self.inner.ops.lock().expect("edit list lock poisoned").push(op);
    }

    fn ops(&self) -> Vec<EditOp> {
        self.inner.ops.lock().expect("edit list lock poisoned").clone()
    }
}

impl fmt::Debug for Rewriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rewriter")
            .field("generation", &self.inner.buffer.generation())
            .field("tokens", &self.inner.buffer.len())
            .field("edits", &self.ops().len())
            .finish()
    }
}
