//! Deterministic resolution of property trees.
//!
//! The resolver walks a [`Prop`] tree and produces plain JSON:
//!
//! - maps keep their keys, lists keep their order, scalars pass through
//! - tokens are resolved in the current [`ResolveContext`]; whatever they
//!   produce is resolved again, so chains of tokens collapse fully
//! - strings are scanned for markers and re-assembled, falling back to an
//!   `Fn::Join` when some fragment is not a literal
//!
//! A visitation stack of token ids guards against cycles of any length.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::trace;

use crate::encoding::{Fragment, TokenMap};
use crate::error::{CoreError, CoreResult};
use crate::intrinsics::concat_fragments;
use crate::token::{Reference, Token, TokenId, TokenKind};
use crate::value::Prop;

/// Rewritten forms of cross-stack references, keyed by consuming stack.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: BTreeMap<(String, TokenId), Prop>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record how `consumer` must read the reference token `id`.
    pub fn insert(&mut self, consumer: impl Into<String>, id: TokenId, replacement: Prop) {
        self.entries.insert((consumer.into(), id), replacement);
    }

    pub fn get(&self, consumer: &str, id: TokenId) -> Option<&Prop> {
        self.entries.get(&(consumer.to_string(), id))
    }

    pub fn contains(&self, consumer: &str, id: TokenId) -> bool {
        self.get(consumer, id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a resolution function may look at.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    stack: &'a str,
    tokens: &'a TokenMap,
    references: &'a ReferenceTable,
}

impl<'a> ResolveContext<'a> {
    pub fn new(stack: &'a str, tokens: &'a TokenMap, references: &'a ReferenceTable) -> Self {
        Self {
            stack,
            tokens,
            references,
        }
    }

    /// Name of the stack being synthesized.
    pub fn stack(&self) -> &'a str {
        self.stack
    }

    pub fn tokens(&self) -> &'a TokenMap {
        self.tokens
    }

    pub fn references(&self) -> &'a ReferenceTable {
        self.references
    }
}

/// Walks property trees in one context.
pub struct Resolver<'a> {
    ctx: ResolveContext<'a>,
    visiting: Vec<Token>,
    discovered: Option<Vec<Token>>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver that fails on unregistered cross-stack references.
    pub fn new(ctx: ResolveContext<'a>) -> Self {
        Self {
            ctx,
            visiting: Vec::new(),
            discovered: None,
        }
    }

    /// Create a resolver that collects unregistered cross-stack references
    /// instead of failing on them.
    pub fn discovering(ctx: ResolveContext<'a>) -> Self {
        Self {
            ctx,
            visiting: Vec::new(),
            discovered: Some(Vec::new()),
        }
    }

    /// References collected so far, in first-seen order.
    pub fn discovered(&self) -> &[Token] {
        self.discovered.as_deref().unwrap_or(&[])
    }

    pub fn into_discovered(self) -> Vec<Token> {
        self.discovered.unwrap_or_default()
    }

    /// Resolve a property tree to JSON.
    pub fn resolve(&mut self, prop: &Prop) -> CoreResult<Value> {
        match prop {
            Prop::Null => Ok(Value::Null),
            Prop::Bool(b) => Ok(Value::Bool(*b)),
            Prop::Number(n) => Ok(Value::Number(n.clone())),
            Prop::String(s) => self.resolve_string(s),
            Prop::List(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<CoreResult<Vec<_>>>()
                .map(Value::Array),
            Prop::Map(entries) => {
                let mut out = serde_json::Map::new();
                for (key, value) in entries {
                    let key = self.resolve_key(key)?;
                    out.insert(key, self.resolve(value)?);
                }
                Ok(Value::Object(out))
            }
            Prop::Token(token) => self.resolve_token(token),
        }
    }

    fn resolve_key(&mut self, key: &str) -> CoreResult<String> {
        if !TokenMap::contains_markers(key) {
            return Ok(key.to_string());
        }
        match self.resolve_string(key)? {
            Value::String(s) => Ok(s),
            _ => Err(CoreError::InvalidKey(key.to_string())),
        }
    }

    fn resolve_string(&mut self, text: &str) -> CoreResult<Value> {
        if !TokenMap::contains_markers(text) {
            return Ok(Value::String(text.to_string()));
        }

        let fragments = self.ctx.tokens().split(text)?;
        if let [Fragment::Token(token)] = fragments.as_slice() {
            return self.resolve_token(token);
        }

        let mut parts = Vec::with_capacity(fragments.len());
        for fragment in &fragments {
            match fragment {
                Fragment::Literal(literal) => parts.push(Value::String(literal.clone())),
                Fragment::Token(token) => parts.push(self.resolve_token(token)?),
            }
        }
        concat_fragments(parts, text)
    }

    fn resolve_token(&mut self, token: &Token) -> CoreResult<Value> {
        if let Some(pos) = self.visiting.iter().position(|t| t.id() == token.id()) {
            let chain = self.visiting[pos..]
                .iter()
                .chain(std::iter::once(token))
                .map(Token::marker)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(CoreError::CyclicReference { chain });
        }

        trace!("Resolving {} in stack {}", token.marker(), self.ctx.stack());
        self.visiting.push(token.clone());
        let result = self.resolve_kind(token);
        self.visiting.pop();
        result
    }

    fn resolve_kind(&mut self, token: &Token) -> CoreResult<Value> {
        match token.kind() {
            TokenKind::Literal(value) => Ok(value.clone()),
            TokenKind::Computed(resolve) => {
                let produced = resolve(&self.ctx)?;
                self.resolve(&produced)
            }
            TokenKind::Reference(reference) => self.resolve_reference(token, reference),
            TokenKind::Concat(parts) => {
                let mut resolved = Vec::with_capacity(parts.len());
                for part in parts {
                    resolved.push(self.resolve(part)?);
                }
                concat_fragments(resolved, &token.marker())
            }
        }
    }

    fn resolve_reference(&mut self, token: &Token, reference: &Reference) -> CoreResult<Value> {
        let consumer = self.ctx.stack();
        if reference.producer() == consumer {
            return self.resolve(reference.target());
        }

        let references = self.ctx.references();
        if let Some(replacement) = references.get(consumer, token.id()) {
            return self.resolve(replacement);
        }

        if let Some(found) = self.discovered.as_mut() {
            if !found.iter().any(|t| t.id() == token.id()) {
                found.push(token.clone());
            }
            // Placeholder only; discovery output is discarded.
            return Ok(Value::String(String::new()));
        }

        Err(CoreError::UnresolvedReference {
            producer: reference.producer().to_string(),
            consumer: consumer.to_string(),
            logical_name: reference.logical_name().to_string(),
        })
    }
}

/// Resolve `prop` in `ctx`.
pub fn resolve(prop: &Prop, ctx: ResolveContext<'_>) -> CoreResult<Value> {
    Resolver::new(ctx).resolve(prop)
}

/// Collect the cross-stack references in `prop` that `ctx` cannot yet resolve.
pub fn discover(prop: &Prop, ctx: ResolveContext<'_>) -> CoreResult<Vec<Token>> {
    let mut resolver = Resolver::discovering(ctx);
    resolver.resolve(prop)?;
    Ok(resolver.into_discovered())
}
