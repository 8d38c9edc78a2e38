//! Dotted paths addressing slots in a container tree

use std::fmt;

use crate::error::ParseError;

/// Separator between path segments.
pub const SEPARATOR: char = '.';

/// Prefix that climbs one enclosing scope before resolution starts.
pub const CLIMB: char = '^';

/// Characters a child name may never contain, besides whitespace.
const RESERVED: &[char] = &[SEPARATOR, CLIMB, '$', '{', '}', '\\', ':', '"'];

/// Check whether `name` can be used as a child name.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c.is_whitespace() || RESERVED.contains(&c))
}

/// A path from a container to one of its descendants.
///
/// All segments but the last are *indirect*: each one steps into a child
/// container. The last segment is *direct*: the key looked up in the
/// innermost container. The empty path addresses the container's own
/// value.
///
/// `climb` records how many enclosing scopes resolution starts above the
/// current one. It is consumed when a reference is anchored to an ancestor
/// container, and plays no part in lookups inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    climb: usize,
    segments: Vec<String>,
}

impl Path {
    /// The empty path (the container's own value).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a path from already-validated segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            climb: 0,
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a dotted path such as `a.b.c` or `^^a.b`.
    ///
    /// Each leading `^` climbs one scope. The empty string parses to the
    /// empty path.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let trimmed = text.trim();
        let rest = trimmed.trim_start_matches(CLIMB);
        let climb = trimmed.len() - rest.len();
        if rest.is_empty() {
            return Ok(Self {
                climb,
                segments: Vec::new(),
            });
        }

        let mut segments = Vec::new();
        for segment in rest.split(SEPARATOR) {
            if !is_valid_name(segment) {
                return Err(ParseError::new(format!(
                    "invalid path segment `{}`",
                    segment
                ))
                .with_expression(text));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { climb, segments })
    }

    /// Return this path with `levels` more scopes to climb.
    pub fn climbed(mut self, levels: usize) -> Self {
        self.climb += levels;
        self
    }

    /// Number of scopes resolution starts above the current one.
    pub fn climb(&self) -> usize {
        self.climb
    }

    /// All segments, indirect then direct.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The segments that step into child containers.
    pub fn indirect(&self) -> &[String] {
        match self.segments.split_last() {
            Some((_, init)) => init,
            None => &[],
        }
    }

    /// The final lookup key, or `None` for the empty path.
    pub fn direct(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Whether this path addresses the container's own value.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a segment.
    pub fn join(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self {
            climb: self.climb,
            segments,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.climb {
            write!(f, "{}", CLIMB)?;
        }
        write!(f, "{}", self.segments.join("."))
    }
}
