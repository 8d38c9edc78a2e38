//! Parse-time scope builder
//!
//! A [`Scope`] is what a front end (an INI or YAML reader, a test) talks
//! to while it walks its document: it tracks the stack of open sections,
//! compiles each expression against it and inserts the result into the
//! tree.

mod guard;

pub use guard::ScopeGuard;

use std::rc::Rc;

use tracing::trace;

use crate::compile::{compile, CompileContext};
use crate::config::Config;
use crate::container::Container;
use crate::error::{ParseError, Result, TreeError};
use crate::node::NodeRef;
use crate::path::{is_valid_name, Path};

/// The stack of open sections, outermost (the root) first.
///
/// # Example
///
/// ```
/// use livetree::{Config, Scope};
///
/// let mut scope = Scope::new(Config::default());
/// scope.define("name", "world").unwrap();
/// {
///     let mut greeting = scope.section("greeting").unwrap();
///     greeting.define("text", "hello ${^name}").unwrap();
/// }
///
/// let root = scope.root();
/// assert_eq!(root.get_child("greeting.text").unwrap().as_deref(), Some("hello world"));
/// ```
#[derive(Debug)]
pub struct Scope {
    frames: Vec<Rc<Container>>,
    names: Vec<String>,
    config: Config,
}

impl Scope {
    /// Start building a fresh tree.
    pub fn new(config: Config) -> Self {
        Self::with_root(Container::shared(), config)
    }

    /// Start building into an existing tree.
    pub fn with_root(root: Rc<Container>, config: Config) -> Self {
        Self {
            frames: vec![root],
            names: Vec::new(),
            config,
        }
    }

    /// The tree's root.
    pub fn root(&self) -> Rc<Container> {
        self.frames[0].clone()
    }

    /// The innermost open section.
    pub fn current(&self) -> &Rc<Container> {
        &self.frames[self.frames.len() - 1]
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of open sections, the root included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Dotted path of `key` inside the innermost section.
    pub fn dotted_path(&self, key: &str) -> String {
        self.names
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(key))
            .collect::<Vec<_>>()
            .join(".")
    }

    // ═══════════════════════════════════════════════════════════════════
    // Sections
    // ═══════════════════════════════════════════════════════════════════

    /// Open the section `name` inside the current one, creating it if
    /// needed.
    pub fn push_section(&mut self, name: &str) -> std::result::Result<(), TreeError> {
        if !is_valid_name(name) {
            return Err(TreeError::InvalidName {
                name: name.to_string(),
            });
        }
        let path = Path::from_segments([name]);
        let section = self.current().child_or_create(name, &path)?;
        trace!(section = %self.dotted_path(name), "entering section");
        self.frames.push(section);
        self.names.push(name.to_string());
        Ok(())
    }

    /// Close the innermost section. The root is never closed.
    pub fn pop_section(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
            self.names.pop();
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Definitions
    // ═══════════════════════════════════════════════════════════════════

    /// Compile `expression` and insert it at `key` in the current section.
    pub fn define(&mut self, key: &str, expression: &str) -> Result<()> {
        let path = Path::parse(key)?;
        let node = self.compile(key, expression)?;
        self.current().add(&path, node)?;
        Ok(())
    }

    /// Like [`define`](Self::define), with the source line attached to any
    /// parse error.
    pub fn define_at(&mut self, key: &str, expression: &str, line: usize) -> Result<()> {
        let path = Path::parse(key).map_err(|err| err.with_line(line))?;
        let node = self
            .compile(key, expression)
            .map_err(|err| err.with_line(line))?;
        self.current().add(&path, node)?;
        Ok(())
    }

    /// Declare `key` in the current section without defining it yet.
    pub fn declare(&mut self, key: &str) -> Result<()> {
        let path = Path::parse(key)?;
        self.current().declare(&path)?;
        Ok(())
    }

    /// Compile `expression` as the definition of `key` without inserting
    /// it.
    pub fn compile(&self, key: &str, expression: &str) -> std::result::Result<NodeRef, ParseError> {
        let ctx = CompileContext::new(&self.frames, &self.config, self.dotted_path(key));
        compile(expression, &ctx)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
