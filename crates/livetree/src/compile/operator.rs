//! Operator table and node construction

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

use super::lexer::{split_args, Token};
use super::{compile_expression, CompileContext};
use crate::error::ParseError;
use crate::node::{
    Clock, Cmd, Color, ColorSpace, Constant, Env, File, IndexedCache, Map, Modification, NodeRef, Range,
    Save, Smooth, SourceChangedCache, TimedCache,
};
use crate::path::Path;
use crate::reference::AddressRef;

/// Operators that may open a `${...}` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `env <name>`
    Env,
    /// `file <path>`
    File,
    /// `cmd <command line>`
    Cmd,
    /// `color [colorspace] [modification] <value>`
    Color,
    /// `map <from> <to> <value>`
    Map,
    /// `smooth <spring> <drag> <value>`
    Smooth,
    /// `clock <tick_ms> <loop_count> <zero_tick>`
    Clock,
    /// `save <target_path> <value> [delimiter]`
    Save,
    /// `cache <duration_ms> <source>`
    ///
    /// A duration of 0 recomputes on every read.
    Cache,
    /// `source_cache <duration_ms> <key> <calculator>`
    ///
    /// A duration of 0 sets no time-to-live, unlike `cache`: the value is
    /// kept until the key changes.
    SourceCache,
    /// `array_cache <size_or_sibling_path> <index> <calculator>`
    ArrayCache,
}

const OPERATORS: &[Operator] = &[
    Operator::Env,
    Operator::File,
    Operator::Cmd,
    Operator::Color,
    Operator::Map,
    Operator::Smooth,
    Operator::Clock,
    Operator::Save,
    Operator::Cache,
    Operator::SourceCache,
    Operator::ArrayCache,
];

impl Operator {
    /// Look an operator up by name.
    pub fn from_name(name: &str) -> Option<Self> {
        OPERATORS.iter().copied().find(|op| op.name() == name)
    }

    /// The operator's keyword.
    pub fn name(self) -> &'static str {
        match self {
            Operator::Env => "env",
            Operator::File => "file",
            Operator::Cmd => "cmd",
            Operator::Color => "color",
            Operator::Map => "map",
            Operator::Smooth => "smooth",
            Operator::Clock => "clock",
            Operator::Save => "save",
            Operator::Cache => "cache",
            Operator::SourceCache => "source_cache",
            Operator::ArrayCache => "array_cache",
        }
    }

    /// Accepted argument counts, `(min, max)`. `None` as max means the
    /// whole rest of the body is one argument.
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            Operator::Env | Operator::File | Operator::Cmd => (1, None),
            Operator::Color => (1, Some(3)),
            Operator::Save => (2, Some(3)),
            Operator::Cache => (2, Some(2)),
            Operator::Map
            | Operator::Smooth
            | Operator::Clock
            | Operator::SourceCache
            | Operator::ArrayCache => (3, Some(3)),
        }
    }

    /// Whether a `:-` fallback is allowed.
    pub fn takes_fallback(self) -> bool {
        !matches!(
            self,
            Operator::Clock | Operator::Cache | Operator::SourceCache | Operator::ArrayCache
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the node for `op` applied to `args`.
pub(crate) fn build(
    op: Operator,
    args: &str,
    fallback: Option<NodeRef>,
    ctx: &CompileContext<'_>,
) -> Result<NodeRef, ParseError> {
    if fallback.is_some() && !op.takes_fallback() {
        return Err(ParseError::new(format!("`{}` takes no fallback", op)));
    }

    let node: NodeRef = match op {
        Operator::Env => Rc::new(Env::new(
            compile_expression(args, ctx)?,
            ctx.fallback(fallback),
        )),
        Operator::File => Rc::new(File::new(
            compile_expression(args, ctx)?,
            ctx.fallback(fallback),
        )),
        Operator::Cmd => Rc::new(Cmd::new(
            compile_expression(args, ctx)?,
            ctx.config().shell.clone(),
            ctx.fallback(fallback),
        )),
        Operator::Color => {
            let tokens = arguments(op, args)?;
            color(&tokens, ctx, fallback)?
        }
        Operator::Map => {
            let [from, to, value] = exact(op, args)?;
            Rc::new(Map::new(
                range(op, &from)?,
                range(op, &to)?,
                compile_token(&value, ctx)?,
                ctx.fallback(fallback),
            ))
        }
        Operator::Smooth => {
            let [spring, drag, value] = exact(op, args)?;
            Rc::new(Smooth::new(
                compile_token(&value, ctx)?,
                number(op, &spring, "spring")?,
                number(op, &drag, "drag")?,
                ctx.fallback(fallback),
            ))
        }
        Operator::Clock => {
            let [tick, loop_count, zero_tick] = exact(op, args)?;
            let tick: u64 = positive(op, &tick, "tick")?;
            Rc::new(Clock::new(
                Duration::from_millis(tick),
                positive(op, &loop_count, "loop count")?,
                number(op, &zero_tick, "zero tick")?,
            ))
        }
        Operator::Save => {
            let tokens = arguments(op, args)?;
            save(&tokens, ctx, fallback)?
        }
        Operator::Cache => {
            let [duration, source] = exact(op, args)?;
            let duration: u64 = number(op, &duration, "duration")?;
            Rc::new(TimedCache::new(
                compile_token(&source, ctx)?,
                Duration::from_millis(duration),
            ))
        }
        Operator::SourceCache => {
            let [duration, key, calculator] = exact(op, args)?;
            let duration: u64 = number(op, &duration, "duration")?;
            let ttl = (duration > 0).then(|| Duration::from_millis(duration));
            Rc::new(SourceChangedCache::new(
                compile_token(&key, ctx)?,
                compile_token(&calculator, ctx)?,
                ttl,
            ))
        }
        Operator::ArrayCache => {
            let [storage, index, calculator] = exact(op, args)?;
            array_cache(&storage, &index, &calculator, ctx)?
        }
    };
    Ok(node)
}

// ═══════════════════════════════════════════════════════════════════════
// Argument Handling
// ═══════════════════════════════════════════════════════════════════════

fn arguments(op: Operator, args: &str) -> Result<Vec<Token>, ParseError> {
    let tokens = split_args(args)?;
    let (min, max) = op.arity();
    let max = max.unwrap_or(usize::MAX);
    if tokens.len() < min || tokens.len() > max {
        return Err(arity_error(op, tokens.len()));
    }
    Ok(tokens)
}

fn exact<const N: usize>(op: Operator, args: &str) -> Result<[Token; N], ParseError> {
    arguments(op, args)?
        .try_into()
        .map_err(|tokens: Vec<Token>| arity_error(op, tokens.len()))
}

fn arity_error(op: Operator, got: usize) -> ParseError {
    let expected = match op.arity() {
        (min, Some(max)) if min == max => format!("exactly {}", min),
        (min, Some(max)) => format!("{} to {}", min, max),
        (min, None) => format!("at least {}", min),
    };
    ParseError::new(format!(
        "`{}` takes {} arguments, got {}",
        op, expected, got
    ))
}

/// The token as literal text; nested expressions are not allowed here.
fn literal<'t>(op: Operator, token: &'t Token) -> Result<&'t str, ParseError> {
    if token.text.contains("${") {
        return Err(ParseError::new(format!(
            "`{}` expects a literal, got `{}`",
            op, token.text
        )));
    }
    Ok(token.text.trim())
}

fn number<T: FromStr>(op: Operator, token: &Token, what: &str) -> Result<T, ParseError> {
    let text = literal(op, token)?;
    text.parse()
        .map_err(|_| ParseError::new(format!("`{}`: invalid {} `{}`", op, what, text)))
}

fn positive(op: Operator, token: &Token, what: &str) -> Result<u64, ParseError> {
    match number::<u64>(op, token, what)? {
        0 => Err(ParseError::new(format!("`{}`: {} must be positive", op, what))),
        n => Ok(n),
    }
}

/// `min:max`, or a single bound `n` meaning `0:n`.
fn range(op: Operator, token: &Token) -> Result<Range, ParseError> {
    let text = literal(op, token)?;
    let bound = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|_| ParseError::new(format!("`{}`: invalid range `{}`", op, text)))
    };
    match text.split_once(':') {
        Some((min, max)) => Ok(Range::new(bound(min)?, bound(max)?)),
        None => Ok(Range::new(0.0, bound(text)?)),
    }
}

/// Bare tokens are taken as they are; quoted tokens and tokens holding a
/// `${...}` are compiled as expressions.
fn compile_token(token: &Token, ctx: &CompileContext<'_>) -> Result<NodeRef, ParseError> {
    if token.quoted || token.text.contains("${") {
        compile_expression(&token.text, ctx)
    } else {
        Ok(Constant::shared(token.text.as_str()))
    }
}

fn sibling_path(op: Operator, token: &Token) -> Result<Path, ParseError> {
    Path::parse(literal(op, token)?)
}

// ═══════════════════════════════════════════════════════════════════════
// Operators With Optional Arguments
// ═══════════════════════════════════════════════════════════════════════

fn color(
    tokens: &[Token],
    ctx: &CompileContext<'_>,
    fallback: Option<NodeRef>,
) -> Result<NodeRef, ParseError> {
    let op = Operator::Color;
    let Some((value, options)) = tokens.split_last() else {
        return Err(arity_error(op, 0));
    };

    let invalid = |token: &Token| {
        ParseError::new(format!("`color`: unknown option `{}`", token.text))
    };
    let (space, modification) = match options {
        [] => (ColorSpace::default(), None),
        [only] => {
            let text = literal(op, only)?;
            match (text.parse::<ColorSpace>(), text.parse::<Modification>()) {
                (Ok(space), _) => (space, None),
                (_, Ok(modification)) => (ColorSpace::default(), Some(modification)),
                _ => return Err(invalid(only)),
            }
        }
        [space, modification] => (
            literal(op, space)?
                .parse::<ColorSpace>()
                .map_err(|_| invalid(space))?,
            Some(
                literal(op, modification)?
                    .parse::<Modification>()
                    .map_err(|_| invalid(modification))?,
            ),
        ),
        _ => return Err(arity_error(op, tokens.len())),
    };

    Ok(Rc::new(Color::new(
        compile_token(value, ctx)?,
        space,
        modification,
        ctx.fallback(fallback),
    )))
}

fn save(
    tokens: &[Token],
    ctx: &CompileContext<'_>,
    fallback: Option<NodeRef>,
) -> Result<NodeRef, ParseError> {
    let op = Operator::Save;
    let (target, value, delimiter) = match tokens {
        [target, value] => (target, value, None),
        [target, value, delimiter] => (target, value, Some(delimiter)),
        _ => return Err(arity_error(op, tokens.len())),
    };

    let path = sibling_path(op, target)?;
    let anchor = ctx.anchor(&path)?;
    let target_node: NodeRef = Rc::new(AddressRef::new(anchor, path.clone()));

    let delimiter = match delimiter {
        None => ctx.config().save_delimiter,
        Some(token) => {
            let text = literal(op, token)?;
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(ParseError::new(format!(
                        "`save`: delimiter must be a single character, got `{}`",
                        text
                    )))
                }
            }
        }
    };

    Ok(Rc::new(Save::new(
        target_node,
        path.to_string(),
        compile_token(value, ctx)?,
        delimiter,
        ctx.fallback(fallback),
    )))
}

fn array_cache(
    storage: &Token,
    index: &Token,
    calculator: &Token,
    ctx: &CompileContext<'_>,
) -> Result<NodeRef, ParseError> {
    let op = Operator::ArrayCache;
    let index = compile_token(index, ctx)?;
    let calculator = compile_token(calculator, ctx)?;

    if let Ok(size) = literal(op, storage)?.parse::<usize>() {
        return Ok(Rc::new(IndexedCache::with_capacity(size, index, calculator)));
    }

    let path = sibling_path(op, storage)?;
    let sibling = ctx.anchor(&path)?.get_child_ptr(&path);
    let memo = sibling
        .as_ref()
        .and_then(|node| node.as_indexed_cache())
        .map(|cache| cache.memo().clone())
        .ok_or_else(|| {
            ParseError::new(format!("`array_cache`: no array cache at `{}`", path))
        })?;
    Ok(Rc::new(IndexedCache::sharing(memo, index, calculator)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(Operator::from_name("source_cache"), Some(Operator::SourceCache));
        assert_eq!(Operator::from_name("nope"), None);
        for op in OPERATORS {
            assert_eq!(Operator::from_name(op.name()), Some(*op));
        }
    }

    #[test]
    fn test_arity_messages() {
        assert_eq!(
            arity_error(Operator::Map, 2).message,
            "`map` takes exactly 3 arguments, got 2"
        );
        assert_eq!(
            arity_error(Operator::Color, 4).message,
            "`color` takes 1 to 3 arguments, got 4"
        );
    }

    #[test]
    fn test_range_single_bound() {
        let token = Token {
            text: "10".to_string(),
            quoted: false,
        };
        assert_eq!(range(Operator::Map, &token).unwrap(), Range::new(0.0, 10.0));
    }

    #[test]
    fn test_literal_rejects_expressions() {
        let token = Token {
            text: "${x}".to_string(),
            quoted: false,
        };
        assert!(number::<u64>(Operator::Cache, &token, "duration").is_err());
    }
}
