//! Error types for livetree

use std::fmt;

use thiserror::Error;

/// Error raised while compiling an expression string into a node.
///
/// A parse error is fatal to the one key being defined and never affects
/// the rest of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Human-readable error message
    pub message: String,

    /// The expression that failed to compile
    pub expression: Option<String>,

    /// Source line of the key, when the caller knows it
    pub line: Option<usize>,
}

impl ParseError {
    /// Create a new parse error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expression: None,
            line: None,
        }
    }

    /// Attach the offending expression.
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Attach the source line.
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error: {}", self.message)?;
        if let Some(expression) = &self.expression {
            write!(f, " in `{}`", expression)?;
        }
        if let Some(line) = self.line {
            write!(f, " at line {}", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Errors raised while reading a value.
///
/// Every variant except `At` is produced by a single node; `At` wraps a
/// failure with the dotted path of the meta node that gave up on it.
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    /// A path did not resolve to any node
    #[error("Key not found: {path}")]
    KeyNotFound {
        /// The unresolved path
        path: String,
    },

    /// A weak link outlived the tree it pointed into
    #[error("Ancestor destroyed while resolving `{path}`")]
    AncestorDestroyed {
        /// Path being resolved when the link was found dead
        path: String,
    },

    /// A reference was re-entered while it was already being evaluated
    #[error("Cyclic reference through `{path}`")]
    CyclicReference {
        /// Path of the reference that closed the cycle
        path: String,
    },

    /// A slot that must hold a value is empty
    #[error("Required field is empty: {field}")]
    RequiredFieldNull {
        /// Name of the empty field
        field: String,
    },

    /// An indexed cache was queried outside of its size
    #[error("Index {index} out of range for cache of size {size}")]
    IndexOutOfRange {
        /// Requested index
        index: i64,
        /// Size of the backing array
        size: usize,
    },

    /// A value could not be converted to the requested type
    #[error("Cannot convert `{value}` to {target}")]
    Conversion {
        /// The value as a string
        value: String,
        /// The requested type
        target: &'static str,
    },

    /// A file could not be read or written
    #[error("I/O error on `{path}`: {message}")]
    Io {
        /// File path
        path: String,
        /// Underlying error message
        message: String,
    },

    /// A command could not be run or exited unsuccessfully
    #[error("Command `{command}` failed: {reason}")]
    Command {
        /// Command line
        command: String,
        /// Why it failed
        reason: String,
    },

    /// An environment variable is not set
    #[error("Environment variable `{name}` is not set")]
    MissingEnv {
        /// Variable name
        name: String,
    },

    /// A color string could not be parsed
    #[error("Invalid color `{value}`")]
    InvalidColor {
        /// The rejected input
        value: String,
    },

    /// A write-back target refused the value
    #[error("Target `{path}` rejected the value")]
    Rejected {
        /// Path of the target
        path: String,
    },

    /// A failure annotated with the path of the node that reported it
    #[error("{path}: {source}")]
    At {
        /// Dotted path of the failing node
        path: String,
        /// The underlying failure
        #[source]
        source: Box<EvalError>,
    },
}

impl EvalError {
    /// Strip `At` annotations and return the underlying failure.
    pub fn root_cause(&self) -> &EvalError {
        match self {
            EvalError::At { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors raised while shaping a tree (inserting or walking slots).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The slot already holds a value
    #[error("Duplicate key: {path}")]
    DuplicateKey {
        /// Dotted path of the slot
        path: String,
    },

    /// A child name contains a separator or reserved character
    #[error("Invalid name `{name}`")]
    InvalidName {
        /// The rejected name
        name: String,
    },

    /// A path needs a container where a plain value lives
    #[error("Shape conflict at `{path}`: expected a container")]
    ShapeConflict {
        /// Dotted path of the slot
        path: String,
    },
}

/// Errors raised by the clone/optimize resolver.
#[derive(Error, Debug, Clone)]
pub enum CloneError {
    /// A clone produced a node of the wrong kind
    #[error("Clone produced {got}, expected {expected}")]
    UnexpectedKind {
        /// Kind that was expected
        expected: String,
        /// Kind that was produced
        got: String,
    },

    /// A reference reaches a container outside the cloned subtree
    #[error("External dependency on `{path}`")]
    ExternalDependency {
        /// Path of the reference
        path: String,
    },

    /// The ancestor of a reference was dropped before cloning
    #[error("Ancestor destroyed while cloning `{path}`")]
    AncestorDestroyed {
        /// Path of the reference
        path: String,
    },

    /// Evaluation or resolution failed while cloning
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// The destination tree could not take the clone
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl CloneError {
    /// Whether this error aborts the whole clone instead of being recorded
    /// against a single path.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CloneError::UnexpectedKind { .. } | CloneError::AncestorDestroyed { .. }
        )
    }
}

/// Main error type for livetree operations
#[derive(Error, Debug)]
pub enum Error {
    /// Expression compilation failed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Evaluation failed
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// Tree shaping failed
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Cloning failed
    #[error(transparent)]
    Clone(#[from] CloneError),

    /// Configuration could not be loaded
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type alias for livetree operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display_includes_context() {
        let err = ParseError::new("wrong arity")
            .with_expression("${map 1 2}")
            .with_line(7);
        assert_eq!(
            err.to_string(),
            "Parse error: wrong arity in `${map 1 2}` at line 7"
        );
    }

    #[test]
    fn test_root_cause_unwraps_annotations() {
        let err = EvalError::At {
            path: "a.b".to_string(),
            source: Box::new(EvalError::At {
                path: "a".to_string(),
                source: Box::new(EvalError::MissingEnv {
                    name: "HOME".to_string(),
                }),
            }),
        };
        assert!(matches!(err.root_cause(), EvalError::MissingEnv { name } if name == "HOME"));
        assert_eq!(
            err.to_string(),
            "a.b: a: Environment variable `HOME` is not set"
        );
    }

    #[test]
    fn test_fatal_clone_errors() {
        assert!(CloneError::AncestorDestroyed {
            path: "x".to_string()
        }
        .is_fatal());
        assert!(!CloneError::ExternalDependency {
            path: "x".to_string()
        }
        .is_fatal());
        assert!(!CloneError::from(EvalError::KeyNotFound {
            path: "x".to_string()
        })
        .is_fatal());
    }
}
