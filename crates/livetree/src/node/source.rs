//! Source nodes: environment variables, files and shell commands
//!
//! Each source evaluates an inner node to get a name, path or command line,
//! then reads the outside world. None of them is ever fixed.

use std::process::Command;
use std::rc::Rc;

use tracing::debug;

use super::{checked_clone, Evaluate, Fallback, NodeKind, NodeRef};
use crate::context::CloneContext;
use crate::error::{CloneError, EvalError};
use crate::value::Value;

/// Reads an environment variable named by its inner node.
pub struct Env {
    name: NodeRef,
    fallback: Fallback,
}

impl Env {
    /// Create an environment lookup.
    pub fn new(name: NodeRef, fallback: Fallback) -> Self {
        Self { name, fallback }
    }

    fn lookup(&self) -> Result<Value, EvalError> {
        let name = self.name.evaluate_string()?;
        std::env::var(&name)
            .map(Value::String)
            .map_err(|_| EvalError::MissingEnv { name })
    }
}

impl Evaluate for Env {
    fn evaluate(&self) -> Result<Value, EvalError> {
        self.lookup().or_else(|err| self.fallback.recover(err))
    }

    fn is_fixed(&self) -> bool {
        false
    }

    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        Ok(Rc::new(Self::new(
            checked_clone(&self.name, ctx)?,
            self.fallback.clone_in(ctx)?,
        )))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Env
    }
}

/// Reads a whole file whose path is given by its inner node.
///
/// One trailing newline is trimmed. Writing to a `File` node replaces the
/// file's contents.
pub struct File {
    path: NodeRef,
    fallback: Fallback,
}

impl File {
    /// Create a file reader.
    pub fn new(path: NodeRef, fallback: Fallback) -> Self {
        Self { path, fallback }
    }

    fn read(&self) -> Result<Value, EvalError> {
        let path = self.path.evaluate_string()?;
        debug!(%path, "reading file");
        let contents = std::fs::read_to_string(&path).map_err(|err| EvalError::Io {
            path: path.clone(),
            message: err.to_string(),
        })?;
        Ok(Value::String(trim_newline(contents)))
    }
}

impl Evaluate for File {
    fn evaluate(&self) -> Result<Value, EvalError> {
        self.read().or_else(|err| self.fallback.recover(err))
    }

    fn is_fixed(&self) -> bool {
        false
    }

    fn set(&self, value: &Value) -> bool {
        let Ok(path) = self.path.evaluate_string() else {
            return false;
        };
        match std::fs::write(&path, value.to_string()) {
            Ok(()) => true,
            Err(err) => {
                debug!(%path, %err, "file write failed");
                false
            }
        }
    }

    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        Ok(Rc::new(Self::new(
            checked_clone(&self.path, ctx)?,
            self.fallback.clone_in(ctx)?,
        )))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::File
    }
}

/// Runs a command line through a shell and returns its standard output.
///
/// Trailing newlines are trimmed. A non-zero exit status is a failure.
pub struct Cmd {
    command: NodeRef,
    shell: String,
    fallback: Fallback,
}

impl Cmd {
    /// Create a command runner using `shell -c`.
    pub fn new(command: NodeRef, shell: impl Into<String>, fallback: Fallback) -> Self {
        Self {
            command,
            shell: shell.into(),
            fallback,
        }
    }

    fn run(&self) -> Result<Value, EvalError> {
        let command = self.command.evaluate_string()?;
        debug!(shell = %self.shell, %command, "running command");
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(&command)
            .output()
            .map_err(|err| EvalError::Command {
                command: command.clone(),
                reason: err.to_string(),
            })?;
        if !output.status.success() {
            return Err(EvalError::Command {
                command,
                reason: output.status.to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Value::String(stdout.trim_end_matches(['\n', '\r']).to_string()))
    }
}

impl Evaluate for Cmd {
    fn evaluate(&self) -> Result<Value, EvalError> {
        self.run().or_else(|err| self.fallback.recover(err))
    }

    fn is_fixed(&self) -> bool {
        false
    }

    fn clone_node(&self, ctx: &mut CloneContext) -> Result<NodeRef, CloneError> {
        Ok(Rc::new(Self::new(
            checked_clone(&self.command, ctx)?,
            self.shell.clone(),
            self.fallback.clone_in(ctx)?,
        )))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Cmd
    }
}

fn trim_newline(mut s: String) -> String {
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
    s
}
