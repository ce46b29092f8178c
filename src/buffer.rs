//! Immutable token buffers.
//!
//! A [`TokenBuffer`] is the ordered lexical token sequence for one module
//! generation. It is produced by the host's lexer, shared read-only
//! between any number of rewriters, and never mutated — rewriting always
//! derives a new string, it never touches the buffer.

use crate::host::Generation;
use crate::rewriter::RewriteError;

/// One lexical token: a stable position plus its original text span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// 0-based position in the owning buffer
    pub index: usize,
    /// Starting byte offset in the original text (inclusive)
    pub start: usize,
    /// Ending byte offset in the original text (exclusive)
    pub end: usize,
    /// Original literal text
    pub text: String,
}

/// The immutable token sequence for one module generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBuffer {
    tokens: Vec<Token>,
    generation: Generation,
}

impl TokenBuffer {
    /// Build a buffer from lexemes in order, assigning indices and byte
    /// offsets. The original text is the concatenation of the lexemes, so
    /// a lexer feeding this constructor must include whitespace tokens if
    /// the original text contains whitespace.
    pub fn from_lexemes<I, S>(generation: Generation, lexemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tokens = Vec::new();
        let mut offset = 0;
        for (index, lexeme) in lexemes.into_iter().enumerate() {
            let text = lexeme.into();
            let start = offset;
            offset += text.len();
            tokens.push(Token {
                index,
                start,
                end: offset,
                text,
            });
        }
        Self { tokens, generation }
    }

    /// The parse generation this buffer belongs to.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The token at `index`, if in bounds.
    pub fn token(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    /// All tokens in index order.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// The buffer's original text: every token's literal, in order.
    pub fn original_text(&self) -> String {
        let capacity = self.tokens.last().map_or(0, |t| t.end);
        let mut text = String::with_capacity(capacity);
        for token in &self.tokens {
            text.push_str(&token.text);
        }
        text
    }

    /// The original text covered by tokens `start..=end`.
    pub fn text_between(&self, start: usize, end: usize) -> Result<String, RewriteError> {
        self.check_range(start, end)?;
        let mut text = String::new();
        for token in &self.tokens[start..=end] {
            text.push_str(&token.text);
        }
        Ok(text)
    }

    pub(crate) fn check_index(&self, index: usize) -> Result<(), RewriteError> {
        if index >= self.tokens.len() {
            return Err(RewriteError::OutOfRange {
                start: index,
                end: index,
                len: self.tokens.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn check_range(&self, start: usize, end: usize) -> Result<(), RewriteError> {
        if start > end || end >= self.tokens.len() {
            return Err(RewriteError::OutOfRange {
                start,
                end,
                len: self.tokens.len(),
            });
        }
        Ok(())
    }
}
