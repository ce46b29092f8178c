//! The boundary between the rewriting core and its host environment.
//!
//! The core never parses source text and never writes to the live buffers
//! itself. Tokens flow in through [`TokenSource`]; rendered text flows out
//! through [`CommitSink`]. Both are supplied once, when the
//! [`RewritingManager`](crate::RewritingManager) is created.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer::TokenBuffer;

/// Monotonic counter identifying one parse generation of a module.
pub type Generation = u64;

/// Identity of one source module.
///
/// Opaque to the core: it is only ever used as a key into the host's
/// token source and commit sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(Arc<str>);

impl ModuleId {
    /// Create a module identity from any string-like value.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ModuleId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("no token buffer for module '{module}'")]
    UnknownModule { module: ModuleId },
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("commit sink rejected module '{module}': {reason}")]
    Rejected { module: ModuleId, reason: String },

    #[error("I/O error writing module '{module}': {source}")]
    Io {
        module: ModuleId,
        #[source]
        source: std::io::Error,
    },
}

/// Provider of immutable token buffers, one per module generation.
///
/// Produced by the host's parser; the core only reads it.
pub trait TokenSource: Send + Sync {
    /// The current token buffer for `module`, tagged with the generation
    /// it was lexed from.
    fn token_buffer(&self, module: &ModuleId) -> Result<Arc<TokenBuffer>, SourceError>;
}

/// Receiver of rendered module text on a successful commit.
///
/// Writes are synchronous and atomic per module; the core imposes no
/// ordering between modules within one commit.
pub trait CommitSink: Send + Sync {
    /// Replace the live content of `module` with `text`.
    fn replace_module(&self, module: &ModuleId, text: &str) -> Result<(), SinkError>;
}
