//! Token allocation and string-marker encoding.
//!
//! Marker grammar: `${Token[<HINT>.<ID>]}` where `HINT` matches
//! `[A-Za-z0-9_]+` and `ID` is the decimal sequence id.
//!
//! Literal text that happens to look like a marker is escaped by
//! [`TokenMap::escape`], which puts the reserved [`ESCAPE_SENTINEL`] between
//! the `$` and the `{`. Decoding drops the sentinel again. Any other `$` is
//! plain text, so `$${Token[A.1]}` is a dollar sign followed by token 1.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::resolver::ResolveContext;
use crate::token::{Reference, Token, TokenId, TokenKind};
use crate::value::Prop;

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(\x{E000}?)\{Token\[([A-Za-z0-9_]+)\.([0-9]+)\]\}").expect("marker pattern is valid")
});

static MARKER_BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{Token\[[A-Za-z0-9_]+\.[0-9]+\]\}").expect("marker pattern is valid")
});

const MAX_HINT_LEN: usize = 48;

/// Private-use character reserved for escaping marker-shaped literal text.
pub const ESCAPE_SENTINEL: char = '\u{E000}';

/// Piece of a string after marker decoding.
#[derive(Debug, Clone)]
pub enum Fragment {
    Literal(String),
    Token(Token),
}

/// Allocates tokens and decodes the markers they leave in strings.
///
/// Ids are handed out sequentially starting at 1, so two maps built by the
/// same construction code assign identical ids.
#[derive(Debug, Clone, Default)]
pub struct TokenMap {
    last_id: u64,
    tokens: BTreeMap<TokenId, Token>,
}

impl TokenMap {
    /// Create an empty token map.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, hint: &str, kind: TokenKind) -> Token {
        self.last_id += 1;
        let id = TokenId(self.last_id);
        let token = Token::new(id, sanitize_hint(hint), kind);
        debug!("Registered token {}", token.marker());
        self.tokens.insert(id, token.clone());
        token
    }

    /// Token wrapping a value that is already known.
    pub fn literal(&mut self, hint: &str, value: impl Into<serde_json::Value>) -> Token {
        self.register(hint, TokenKind::Literal(value.into()))
    }

    /// Token whose value is produced by `resolve` at synthesis time.
    pub fn computed<F>(&mut self, hint: &str, resolve: F) -> Token
    where
        F: Fn(&ResolveContext<'_>) -> CoreResult<Prop> + Send + Sync + 'static,
    {
        self.register(hint, TokenKind::Computed(std::sync::Arc::new(resolve)))
    }

    /// Token for a value owned by another stack.
    pub fn reference(&mut self, reference: Reference) -> Token {
        let hint = format!("{}_{}", reference.producer(), reference.logical_name());
        self.register(&hint, TokenKind::Reference(reference))
    }

    /// Token concatenating `parts` into one string.
    pub fn concat(&mut self, hint: &str, parts: Vec<Prop>) -> Token {
        self.register(hint, TokenKind::Concat(parts))
    }

    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(&id)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether `text` contains a marker or an escaped marker.
    pub fn contains_markers(text: &str) -> bool {
        MARKER.is_match(text)
    }

    /// Escape literal text so that marker-shaped substrings survive resolution verbatim.
    pub fn escape(text: &str) -> String {
        MARKER_BODY
            .replace_all(text, |caps: &regex::Captures<'_>| {
                format!("${}{}", ESCAPE_SENTINEL, &caps[0][1..])
            })
            .into_owned()
    }

    /// Split `text` into literal and token fragments.
    ///
    /// Adjacent literal fragments are merged. Markers with an unknown id or
    /// a hint that does not match the registered token are rejected.
    pub fn split(&self, text: &str) -> CoreResult<Vec<Fragment>> {
        let mut fragments = Vec::new();
        let mut cursor = 0;

        for caps in MARKER.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            push_literal(&mut fragments, &text[cursor..whole.start()]);
            cursor = whole.end();

            if !caps[1].is_empty() {
                push_literal(&mut fragments, &whole.as_str().replacen(ESCAPE_SENTINEL, "", 1));
                continue;
            }

            let marker = whole.as_str();
            let id = caps[3]
                .parse::<u64>()
                .map_err(|_| CoreError::UnknownToken(marker.to_string()))?;
            let token = self
                .tokens
                .get(&TokenId(id))
                .filter(|token| token.hint() == &caps[2])
                .ok_or_else(|| CoreError::UnknownToken(marker.to_string()))?;
            fragments.push(Fragment::Token(token.clone()));
        }

        push_literal(&mut fragments, &text[cursor..]);
        Ok(fragments)
    }
}

fn push_literal(fragments: &mut Vec<Fragment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Fragment::Literal(last)) = fragments.last_mut() {
        last.push_str(text);
    } else {
        fragments.push(Fragment::Literal(text.to_string()));
    }
}

fn sanitize_hint(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_HINT_LEN)
        .collect();
    if cleaned.is_empty() {
        "TOKEN".to_string()
    } else {
        cleaned
    }
}
