//! Intermediate representation produced by the walker.
//!
//! A view compiles to an ordered sequence of [`Op`]s. Expressions are held
//! as [`UnitHandle`]s into the code host until the batch compile resolves
//! them.

use crate::code_host::UnitHandle;
use crate::error::{CompileError, CompileResult};
use tracing::error;

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    StaticText(String),
    Expression(UnitHandle),
    Conditional {
        condition: UnitHandle,
        then_ops: Vec<Op>,
        else_ops: Option<Vec<Op>>,
    },
}

/// Builds the op sequence with a scope stack for conditional bodies
///
/// Adjacent static text is buffered into one run and only flushed when a
/// non-text op is emitted, a scope changes, or the build finishes.
#[derive(Debug)]
pub struct IrBuilder {
    scopes: Vec<Vec<Op>>,
    text_run: String,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self {
            scopes: vec![Vec::new()],
            text_run: String::new(),
        }
    }

    pub fn write(&mut self, text: &str) {
        self.text_run.push_str(text);
    }

    pub fn write_char(&mut self, c: char) {
        self.text_run.push(c);
    }

    pub fn expression(&mut self, unit: UnitHandle) {
        self.push_op(Op::Expression(unit));
    }

    /// Open a fresh sequence for a conditional branch
    pub fn push_scope(&mut self) {
        self.flush_text_run();
        self.scopes.push(Vec::new());
    }

    /// Close the innermost sequence and hand it back to the caller
    pub fn pop_scope(&mut self) -> CompileResult<Vec<Op>> {
        self.flush_text_run();
        if self.scopes.len() < 2 {
            error!(depth = self.scopes.len(), "scope popped past the root sequence");
            return Err(CompileError::StackMisaligned {
                depth: self.scopes.len().saturating_sub(1),
            });
        }
        Ok(self.scopes.pop().unwrap_or_default())
    }

    pub fn conditional(&mut self, condition: UnitHandle, then_ops: Vec<Op>) {
        self.push_op(Op::Conditional {
            condition,
            then_ops,
            else_ops: None,
        });
    }

    /// True when the open sequence ends with a conditional lacking an else
    pub fn can_attach_else(&self) -> bool {
        matches!(
            self.current().and_then(|ops| ops.last()),
            Some(Op::Conditional { else_ops: None, .. })
        ) && self.text_run.is_empty()
    }

    /// Attach `ops` as the else branch of the trailing conditional.
    /// Returns the ops back if the open sequence does not end with one.
    pub fn attach_else(&mut self, ops: Vec<Op>) -> Result<(), Vec<Op>> {
        if !self.text_run.is_empty() {
            return Err(ops);
        }
        match self.scopes.last_mut().and_then(|seq| seq.last_mut()) {
            Some(Op::Conditional { else_ops, .. }) if else_ops.is_none() => {
                *else_ops = Some(ops);
                Ok(())
            }
            _ => Err(ops),
        }
    }

    /// Flush remaining text and return the root sequence. Exactly one
    /// sequence must be open.
    pub fn finish(mut self) -> CompileResult<Vec<Op>> {
        self.flush_text_run();
        if self.scopes.len() != 1 {
            error!(depth = self.scopes.len(), "IR scope stack misaligned at finish");
            return Err(CompileError::StackMisaligned {
                depth: self.scopes.len(),
            });
        }
        Ok(self.scopes.pop().unwrap_or_default())
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn current(&self) -> Option<&Vec<Op>> {
        self.scopes.last()
    }

    fn push_op(&mut self, op: Op) {
        self.flush_text_run();
        if let Some(seq) = self.scopes.last_mut() {
            seq.push(op);
        }
    }

    fn flush_text_run(&mut self) {
        if self.text_run.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text_run);
        if let Some(seq) = self.scopes.last_mut() {
            seq.push(Op::StaticText(text));
        }
    }
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}
