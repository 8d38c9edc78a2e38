//! Expression compiler
//!
//! Turns one raw expression string into a node tree:
//!
//! ```text
//! expression  := (text | escape | "${" inner "}")*
//! escape      := "\$" | "\\"
//! inner       := body [":-" expression]
//! body        := path | operator args
//! path        := "^"* segment ("." segment)*
//! ```
//!
//! A body is an operator application when its first word names an
//! operator and arguments follow; otherwise it is a reference. References
//! are anchored on the scope the key is defined in (or above it, see
//! [`ScopeMode`](crate::ScopeMode)); each leading `^` climbs one more.

mod lexer;
mod operator;

pub use operator::Operator;

use std::rc::Rc;

use crate::config::Config;
use crate::container::Container;
use crate::error::ParseError;
use crate::node::{Constant, Fallback, Interpolate, NodeRef, Variable};
use crate::path::Path;
use crate::reference::AddressRef;

use lexer::{split_fallback, split_head, split_template, Piece};

/// Where an expression is being compiled.
pub struct CompileContext<'a> {
    frames: &'a [Rc<Container>],
    config: &'a Config,
    origin: String,
}

impl<'a> CompileContext<'a> {
    /// Compile in the innermost of `frames` (outermost first) for the key
    /// at dotted path `origin`.
    pub fn new(frames: &'a [Rc<Container>], config: &'a Config, origin: impl Into<String>) -> Self {
        Self {
            frames,
            config,
            origin: origin.into(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        self.config
    }

    /// Dotted path of the key being compiled.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The container a reference with this path is resolved against.
    ///
    /// Climbing past the outermost frame stops there.
    pub fn anchor(&self, path: &Path) -> Result<&'a Rc<Container>, ParseError> {
        let climb = path.climb() + self.config.scope_mode.base_climb();
        let index = self.frames.len().saturating_sub(climb + 1);
        self.frames
            .get(index)
            .ok_or_else(|| ParseError::new("no scope to resolve references against"))
    }

    pub(crate) fn fallback(&self, node: Option<NodeRef>) -> Fallback {
        Fallback::new(self.origin.clone()).with_optional(node)
    }
}

/// Compile the expression defining a key.
///
/// Plain text becomes a settable [`Variable`]; anything holding `${...}`
/// becomes the node it describes.
pub fn compile(expression: &str, ctx: &CompileContext<'_>) -> Result<NodeRef, ParseError> {
    split_template(expression)
        .and_then(|pieces| assemble(pieces, ctx, true))
        .map_err(|err| err.with_expression(expression))
}

/// Compile a nested expression. Plain text becomes a [`Constant`].
pub fn compile_expression(expression: &str, ctx: &CompileContext<'_>) -> Result<NodeRef, ParseError> {
    assemble(split_template(expression)?, ctx, false)
}

fn assemble(pieces: Vec<Piece>, ctx: &CompileContext<'_>, settable: bool) -> Result<NodeRef, ParseError> {
    let literal = |text: &str| -> NodeRef {
        if settable {
            Variable::shared(text)
        } else {
            Constant::shared(text)
        }
    };

    match pieces.as_slice() {
        [] => Ok(literal("")),
        [Piece::Text(text)] => Ok(literal(text.as_str())),
        [Piece::Inner(inner)] => compile_inner(inner, ctx),
        _ => {
            let parts = pieces
                .iter()
                .map(|piece| match piece {
                    Piece::Text(text) => Ok(Constant::shared(text.as_str())),
                    Piece::Inner(inner) => compile_inner(inner, ctx),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Rc::new(Interpolate::new(parts)))
        }
    }
}

fn compile_inner(inner: &str, ctx: &CompileContext<'_>) -> Result<NodeRef, ParseError> {
    let (body, fallback) = split_fallback(inner);
    let fallback = fallback
        .map(|text| compile_expression(text, ctx))
        .transpose()?;

    let (head, rest) = split_head(body);
    if head.is_empty() {
        return Err(ParseError::new("empty `${}`"));
    }
    if !rest.is_empty() {
        let op = Operator::from_name(head)
            .ok_or_else(|| ParseError::new(format!("unknown operator `{}`", head)))?;
        return operator::build(op, rest, fallback, ctx);
    }

    let path = Path::parse(head)?;
    let anchor = ctx.anchor(&path)?;
    Ok(Rc::new(
        AddressRef::new(anchor, path).with_optional_fallback(fallback),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use pretty_assertions::assert_eq;

    fn kind_of(expression: &str) -> NodeKind {
        let root = Container::shared();
        let frames = [root];
        let config = Config::default();
        let ctx = CompileContext::new(&frames, &config, "k");
        compile(expression, &ctx).unwrap().kind()
    }

    #[test]
    fn test_node_shapes() {
        assert_eq!(kind_of("plain"), NodeKind::Variable);
        assert_eq!(kind_of(""), NodeKind::Variable);
        assert_eq!(kind_of("${a}"), NodeKind::AddressRef);
        assert_eq!(kind_of("x${a}"), NodeKind::Interpolate);
        assert_eq!(kind_of("${env HOME}"), NodeKind::Env);
        assert_eq!(kind_of("${cache 100 ${a}}"), NodeKind::TimedCache);
        assert_eq!(kind_of(r"\${a}"), NodeKind::Variable);
    }

    #[test]
    fn test_anchor_climbs_and_clamps() {
        let outer = Container::shared();
        let inner = Container::shared();
        let frames = [outer.clone(), inner.clone()];
        let config = Config::default();
        let ctx = CompileContext::new(&frames, &config, "k");

        let here = ctx.anchor(&Path::parse("a").unwrap()).unwrap();
        assert!(Rc::ptr_eq(here, &inner));
        let up = ctx.anchor(&Path::parse("^a").unwrap()).unwrap();
        assert!(Rc::ptr_eq(up, &outer));
        let far = ctx.anchor(&Path::parse("^^^a").unwrap()).unwrap();
        assert!(Rc::ptr_eq(far, &outer));
    }

    #[test]
    fn test_parent_scope_mode() {
        let outer = Container::shared();
        let inner = Container::shared();
        let frames = [outer.clone(), inner];
        let config = Config::default().with_scope_mode(crate::config::ScopeMode::Parent);
        let ctx = CompileContext::new(&frames, &config, "k");
        let anchor = ctx.anchor(&Path::parse("a").unwrap()).unwrap();
        assert!(Rc::ptr_eq(anchor, &outer));
    }

    #[test]
    fn test_errors_carry_expression() {
        let root = Container::shared();
        let frames = [root];
        let config = Config::default();
        let ctx = CompileContext::new(&frames, &config, "k");
        let err = compile("x ${map 1 2}", &ctx).unwrap_err();
        assert_eq!(err.expression.as_deref(), Some("x ${map 1 2}"));
        assert!(compile("${}", &ctx).is_err());
        assert!(compile("${frobnicate a b}", &ctx).is_err());
    }
}
