//! Expression units and the batch compile port.
//!
//! Every embedded expression found by the walker is registered here as a
//! named unit. Once the walk is done the code host renders all units into
//! one generated program and submits it to an [`ExpressionCompiler`] in a
//! single call. The backend answers with a [`CompiledLibrary`] whose entry
//! points are looked up by unit name, or with a list of diagnostics.

use crate::error::{CompileError, CompileResult, UnitError};
use crate::options::UnitSharing;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Index of a registered unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitHandle(pub usize);

/// Declared return kind of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReturnKind {
    Text,
    Boolean,
}

impl ReturnKind {
    /// Return type keyword used in the generated program
    pub fn keyword(self) -> &'static str {
        match self {
            ReturnKind::Text => "text",
            ReturnKind::Boolean => "bool",
        }
    }
}

/// An embedded code fragment destined to become one entry point
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionUnit {
    pub name: String,
    pub source: String,
    pub kind: ReturnKind,
    /// Template line of the first site that registered the unit
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Library,
}

/// Input of one batch compile
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    pub model_type: &'a str,
    pub source: &'a str,
    pub references: &'a [String],
    pub output: OutputKind,
}

/// A problem reported by the expression compiler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// Unit the problem belongs to, when known
    pub unit: Option<String>,
    /// Line in the generated program
    pub line: usize,
    /// Byte range in the generated program
    pub span: Option<Range<usize>>,
    /// Line in the template the unit came from
    pub template_line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            unit: None,
            line,
            span: None,
            template_line: None,
            message: message.into(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_span(mut self, span: Range<usize>) -> Self {
        self.span = Some(span);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.unit, self.template_line) {
            (Some(unit), Some(line)) => write!(f, "{} (template line {}): ", unit, line)?,
            (Some(unit), None) => write!(f, "{}: ", unit)?,
            (None, _) => write!(f, "line {}: ", self.line)?,
        }
        f.write_str(&self.message)
    }
}

pub type TextFn = Arc<dyn Fn(&Value) -> Result<String, UnitError> + Send + Sync>;
pub type BoolFn = Arc<dyn Fn(&Value) -> Result<bool, UnitError> + Send + Sync>;

/// Callable compiled from one unit. Takes the model's value view.
#[derive(Clone)]
pub enum EntryPoint {
    Text(TextFn),
    Boolean(BoolFn),
}

impl EntryPoint {
    pub fn kind(&self) -> ReturnKind {
        match self {
            EntryPoint::Text(_) => ReturnKind::Text,
            EntryPoint::Boolean(_) => ReturnKind::Boolean,
        }
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryPoint::{:?}", self.kind())
    }
}

/// Loaded output of a successful batch compile
pub trait CompiledLibrary: Send + Sync {
    fn entry_point(&self, name: &str) -> Option<EntryPoint>;
}

/// Port to whatever turns the generated program into callables
pub trait ExpressionCompiler: Send + Sync {
    fn compile(
        &self,
        request: &CompileRequest<'_>,
    ) -> Result<Box<dyn CompiledLibrary>, Vec<Diagnostic>>;
}

/// Unit table for one view compile
#[derive(Debug)]
pub struct CodeHost {
    model_type: String,
    sharing: UnitSharing,
    units: Vec<ExpressionUnit>,
    shared: HashMap<(ReturnKind, String), UnitHandle>,
}

impl CodeHost {
    pub fn new(model_type: impl Into<String>, sharing: UnitSharing) -> Self {
        Self {
            model_type: model_type.into(),
            sharing,
            units: Vec::new(),
            shared: HashMap::new(),
        }
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    /// Register an expression and return its handle
    pub fn register(&mut self, source: &str, kind: ReturnKind, line: usize) -> UnitHandle {
        let source = source.trim();
        if self.sharing == UnitSharing::Dedupe {
            if let Some(handle) = self.shared.get(&(kind, source.to_string())) {
                return *handle;
            }
        }

        let handle = UnitHandle(self.units.len());
        let name = match self.sharing {
            UnitSharing::Dedupe => unit_name(kind, source),
            UnitSharing::PerSite => format!("{}_{}", unit_name(kind, source), handle.0),
        };
        debug!(unit = %name, kind = ?kind, line, "registered expression unit");

        self.units.push(ExpressionUnit {
            name,
            source: source.to_string(),
            kind,
            line,
        });
        if self.sharing == UnitSharing::Dedupe {
            self.shared.insert((kind, source.to_string()), handle);
        }
        handle
    }

    pub fn units(&self) -> &[ExpressionUnit] {
        &self.units
    }

    pub fn unit(&self, handle: UnitHandle) -> Option<&ExpressionUnit> {
        self.units.get(handle.0)
    }

    /// The generated program: one pure function per unit, body verbatim
    pub fn program_source(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "// generated by nhaml");
        let _ = writeln!(out, "// model: {}", self.model_type);
        for unit in &self.units {
            let _ = writeln!(out);
            let _ = writeln!(out, "fn {}(model) -> {} {{", unit.name, unit.kind.keyword());
            let _ = writeln!(out, "    {}", unit.source);
            let _ = writeln!(out, "}}");
        }
        out
    }

    /// Submit every unit in one batch and resolve each to its entry point
    #[instrument(skip_all, fields(model_type = %self.model_type, units = self.units.len()))]
    pub fn compile(
        &self,
        backend: &dyn ExpressionCompiler,
        references: &[String],
    ) -> CompileResult<ResolvedUnits> {
        let source = self.program_source();
        debug!(bytes = source.len(), "submitting batch compile");

        let request = CompileRequest {
            model_type: &self.model_type,
            source: &source,
            references,
            output: OutputKind::Library,
        };

        let library = backend
            .compile(&request)
            .map_err(|diagnostics| self.failed(diagnostics))?;

        let mut entries = Vec::with_capacity(self.units.len());
        let mut problems = Vec::new();
        for unit in &self.units {
            match library.entry_point(&unit.name) {
                Some(entry) if entry.kind() == unit.kind => entries.push(entry),
                Some(entry) => problems.push(
                    Diagnostic::new(
                        0,
                        format!(
                            "entry point returns {:?}, expected {:?}",
                            entry.kind(),
                            unit.kind
                        ),
                    )
                    .with_unit(&unit.name),
                ),
                None => problems.push(
                    Diagnostic::new(0, "compiled library has no such entry point")
                        .with_unit(&unit.name),
                ),
            }
        }

        if !problems.is_empty() {
            return Err(self.failed(problems));
        }

        Ok(ResolvedUnits {
            names: self.units.iter().map(|unit| unit.name.clone()).collect(),
            entries,
        })
    }

    fn failed(&self, mut diagnostics: Vec<Diagnostic>) -> CompileError {
        for diagnostic in &mut diagnostics {
            if let Some(unit) = diagnostic
                .unit
                .as_deref()
                .and_then(|name| self.units.iter().find(|u| u.name == name))
            {
                diagnostic.template_line = Some(unit.line);
            }
        }
        warn!(
            model_type = %self.model_type,
            count = diagnostics.len(),
            "batch compile rejected"
        );
        CompileError::CompilationFailed {
            model_type: self.model_type.clone(),
            diagnostics,
        }
    }
}

/// Stable name for a unit: CRC32 over its kind and source
pub fn unit_name(kind: ReturnKind, source: &str) -> String {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind.keyword().as_bytes());
    hasher.update(b":");
    hasher.update(source.as_bytes());
    format!("_{:08x}", hasher.finalize())
}

/// Entry points in unit order, addressed by [`UnitHandle`]
#[derive(Debug, Clone)]
pub struct ResolvedUnits {
    names: Vec<String>,
    entries: Vec<EntryPoint>,
}

impl ResolvedUnits {
    pub fn get(&self, handle: UnitHandle) -> Option<&EntryPoint> {
        self.entries.get(handle.0)
    }

    pub fn name(&self, handle: UnitHandle) -> &str {
        self.names.get(handle.0).map(String::as_str).unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
