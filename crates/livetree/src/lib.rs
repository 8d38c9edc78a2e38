//! # livetree
//!
//! A configuration-templating engine: a tree of named values in which any
//! value may be a live expression.
//!
//! Values are nodes evaluated lazily on demand. A node may reference
//! another value by path, read an environment variable, a file or a
//! command's output, cache a computation, rescale a number, transform a
//! color, or interpolate other expressions into a string.
//!
//! ## Architecture
//!
//! - **Values and nodes**: [`Value`] and the [`Evaluate`] trait
//! - **Containers**: [`Container`], the ordered, nested name → slot tree
//! - **References**: [`AddressRef`] by path, [`Ref`] by direct link
//! - **Resolver**: [`Container::clone_tree`] copies a tree, optionally
//!   collapsing references into direct links
//! - **Front door**: [`Scope`] compiles expressions into a tree
//!
//! ## Example
//!
//! ```
//! use livetree::Scope;
//!
//! let mut scope = Scope::default();
//! scope.define("key", "a").unwrap();
//! scope.define("alias", "${key}").unwrap();
//!
//! let root = scope.root();
//! assert_eq!(root.get_child("alias").unwrap().as_deref(), Some("a"));
//! assert!(root.set("key", "b"));
//! assert_eq!(root.get_child("alias").unwrap().as_deref(), Some("b"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compile;
pub mod config;
pub mod container;
pub mod context;
pub mod error;
pub mod node;
pub mod path;
pub mod reference;
pub mod resolver;
pub mod scope;
pub mod value;

// Re-export main types
pub use compile::{compile, compile_expression, CompileContext, Operator};
pub use config::{Config, ScopeMode};
pub use container::{Container, Slot};
pub use context::{CloneContext, CloneFailure, CloneOptions};
pub use error::{CloneError, Error, EvalError, ParseError, Result, TreeError};
pub use node::{
    checked_clone, Clock, Cmd, Color, ColorSpace, Constant, Env, Evaluate, Fallback, File,
    IndexedCache, Interpolate, Map, Modification, NodeKind, NodeRef, Range, Rgba, Save,
    SharedMemo, Smooth, SourceChangedCache, TimedCache, Variable,
};
pub use path::Path;
pub use reference::{AddressRef, Ref};
pub use resolver::{clone_into, CloneOutcome};
pub use scope::{Scope, ScopeGuard};
pub use value::{Value, ValueType};

/// livetree version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }
}
