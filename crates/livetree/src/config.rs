//! Compile-time configuration
//!
//! Loaded from JSON or built in code. Every field has a default, so an
//! empty object is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Where a reference without `^` starts resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMode {
    /// The section the key is defined in
    #[default]
    Current,
    /// The section enclosing that one
    Parent,
}

impl ScopeMode {
    /// Scopes every reference climbs before its own `^` prefixes apply.
    pub fn base_climb(self) -> usize {
        match self {
            ScopeMode::Current => 0,
            ScopeMode::Parent => 1,
        }
    }
}

/// Settings consulted while compiling expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Anchor for bare references
    pub scope_mode: ScopeMode,

    /// Delimiter used by `save` when the expression names none
    pub save_delimiter: char,

    /// Shell that runs `cmd` command lines, invoked as `<shell> -c <line>`
    pub shell: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scope_mode: ScopeMode::Current,
            save_delimiter: ';',
            shell: "sh".to_string(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set the scope mode.
    pub fn with_scope_mode(mut self, scope_mode: ScopeMode) -> Self {
        self.scope_mode = scope_mode;
        self
    }

    /// Set the default `save` delimiter.
    pub fn with_save_delimiter(mut self, delimiter: char) -> Self {
        self.save_delimiter = delimiter;
        self
    }

    /// Set the shell for `cmd`.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}
