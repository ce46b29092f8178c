//! An in-memory module store.
//!
//! [`InMemoryModules`] implements both sides of the host boundary —
//! [`TokenSource`] and [`CommitSink`] — over a map of named modules. It
//! backs embedded uses that have no live editor, and every test in this
//! crate.
//!
//! Committing replaces the stored text and bumps the module's generation,
//! but does not re-lex: producing a fresh token buffer is the host
//! parser's job, so the store keeps serving the last installed buffer
//! until [`install`](InMemoryModules::install) is called again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::buffer::TokenBuffer;
use crate::host::{CommitSink, Generation, ModuleId, SinkError, SourceError, TokenSource};

#[derive(Default)]
pub struct InMemoryModules {
    modules: Mutex<HashMap<ModuleId, ModuleEntry>>,
}

struct ModuleEntry {
    buffer: Arc<TokenBuffer>,
    text: String,
    generation: Generation,
}

impl InMemoryModules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or reinstall) a module from its lexemes. The stored text
    /// becomes the concatenation of the lexemes and the module's
    /// generation is reset to `generation`.
    pub fn install<I, S>(&self, module: impl Into<ModuleId>, generation: Generation, lexemes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buffer = Arc::new(TokenBuffer::from_lexemes(generation, lexemes));
        let entry = ModuleEntry {
            text: buffer.original_text(),
            generation,
            buffer,
        };
        self.lock_modules().insert(module.into(), entry);
    }

    /// The module's current text, if registered.
    pub fn text(&self, module: &ModuleId) -> Option<String> {
        self.lock_modules().get(module).map(|e| e.text.clone())
    }

    /// The module's current generation, if registered. Starts at the
    /// installed buffer's generation and advances on every commit.
    pub fn generation(&self, module: &ModuleId) -> Option<Generation> {
        self.lock_modules().get(module).map(|e| e.generation)
    }

    fn lock_modules(&self) -> MutexGuard<'_, HashMap<ModuleId, ModuleEntry>> {
        self.modules.lock().expect("module store lock poisoned")
    }
}

impl TokenSource for InMemoryModules {
    fn token_buffer(&self, module: &ModuleId) -> Result<Arc<TokenBuffer>, SourceError> {
        self.lock_modules()
            .get(module)
            .map(|e| Arc::clone(&e.buffer))
            .ok_or_else(|| SourceError::UnknownModule {
                module: module.clone(),
            })
    }
}

impl CommitSink for InMemoryModules {
    fn replace_module(&self, module: &ModuleId, text: &str) -> Result<(), SinkError> {
        let mut modules = self.lock_modules();
        let entry = modules.get_mut(module).ok_or_else(|| SinkError::Rejected {
            module: module.clone(),
            reason: "module not registered".into(),
        })?;
        entry.text = text.to_string();
        entry.generation += 1;
        Ok(())
    }
}
