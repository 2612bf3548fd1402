//! Deferred values.
//!
//! A [`Token`] stands in for a value that is not known while the construct
//! tree is being built. Tokens are allocated by a [`crate::TokenMap`], which
//! gives each one a sequence id and a textual marker so it can travel inside
//! plain strings.

use std::fmt;
use std::sync::Arc;

use crate::error::CoreResult;
use crate::resolver::ResolveContext;
use crate::value::Prop;

/// Sequence id of a token within its [`crate::TokenMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId(pub(crate) u64);

impl TokenId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolution function of a computed token.
///
/// Must be pure given the context. The returned property tree may contain
/// further tokens; the resolver resolves those as well.
pub type ResolveFn = Arc<dyn Fn(&ResolveContext<'_>) -> CoreResult<Prop> + Send + Sync>;

/// Value exported by one stack and consumed by another.
#[derive(Debug, Clone)]
pub struct Reference {
    producer: String,
    logical_name: String,
    target: Box<Prop>,
}

impl Reference {
    /// Create a reference.
    ///
    /// `target` is the accessor that yields the value inside the producing
    /// stack's own template, e.g. `{"Ref": "Bucket"}`.
    pub fn new(producer: impl Into<String>, logical_name: impl Into<String>, target: Prop) -> Self {
        Self {
            producer: producer.into(),
            logical_name: logical_name.into(),
            target: Box::new(target),
        }
    }

    /// Name of the producing stack.
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Identity of the exported value within the producing stack.
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// In-template accessor within the producing stack.
    pub fn target(&self) -> &Prop {
        &self.target
    }
}

/// The closed set of deferred value variants.
#[derive(Clone)]
pub enum TokenKind {
    /// A value fixed at construction time.
    Literal(serde_json::Value),
    /// A value produced by a resolution function.
    Computed(ResolveFn),
    /// A cross-stack capable reference.
    Reference(Reference),
    /// String concatenation of the resolved parts.
    Concat(Vec<Prop>),
}

impl fmt::Debug for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            TokenKind::Computed(_) => f.write_str("Computed(<fn>)"),
            TokenKind::Reference(reference) => f.debug_tuple("Reference").field(reference).finish(),
            TokenKind::Concat(parts) => f.debug_tuple("Concat").field(parts).finish(),
        }
    }
}

/// A deferred value.
#[derive(Debug, Clone)]
pub struct Token {
    id: TokenId,
    hint: String,
    kind: TokenKind,
}

impl Token {
    pub(crate) fn new(id: TokenId, hint: String, kind: TokenKind) -> Self {
        Self { id, hint, kind }
    }

    pub fn id(&self) -> TokenId {
        self.id
    }

    /// Display hint used in the string marker.
    pub fn hint(&self) -> &str {
        &self.hint
    }

    pub fn kind(&self) -> &TokenKind {
        &self.kind
    }

    /// Textual marker for embedding this token inside a string.
    pub fn marker(&self) -> String {
        format!("${{Token[{}.{}]}}", self.hint, self.id)
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match &self.kind {
            TokenKind::Reference(reference) => Some(reference),
            _ => None,
        }
    }
}

/// Tokens are equal when they share an id; ids are unique per map.
impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.marker())
    }
}
