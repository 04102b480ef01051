use crate::code_host::Diagnostic;
use nhaml_common::CommonError;
use nhaml_parser::ParseError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error raised by a compiled expression while rendering. It is passed
/// through to the caller exactly as the backend produced it.
pub type UnitError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type CompileResult<T> = Result<T, CompileError>;

/// Errors that abort compiling a view
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Malformed tag on line {line} : {message}")]
    MalformedTag { line: usize, message: String },

    #[error("Malformed variable on line {line} : {variable}")]
    MalformedVariable { line: usize, variable: String },

    #[error("Malformed code on line {line} : {message}")]
    MalformedCode { line: usize, message: String },

    #[error("Unsupported code on line {line} : \"{content}\" (only `if (...)` and `else` are allowed)")]
    UnsupportedCodeConstruct { line: usize, content: String },

    #[error("`else` on line {line} does not follow an `if` at the same level")]
    ElseWithoutIf { line: usize },

    #[error("Node stack misaligned: expected 1 open sequence, found {depth}")]
    StackMisaligned { depth: usize },

    #[error("Partial {name} includes itself")]
    RecursivePartial { name: String },

    #[error("Failed to compile inline code for template (model {model_type}): {}", DiagnosticList(.diagnostics))]
    CompilationFailed {
        model_type: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("Unable to find partial : {}", .path.display())]
    PartialNotFound { path: PathBuf },

    #[error("Failed to load template {}: {source}", .path.display())]
    TemplateLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Compilation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Compilation aborted: {0}")]
    Aborted(String),
}

impl CompileError {
    /// Map a template loading failure for `path` onto the compile taxonomy
    pub fn from_load(path: PathBuf, err: CommonError) -> Self {
        match err {
            err if err.is_not_found() => CompileError::PartialNotFound { path },
            CommonError::Parse(parse) => parse.into(),
            CommonError::Io(io) => CompileError::TemplateLoad { path, source: io },
        }
    }
}

impl From<ParseError> for CompileError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::MalformedTag { line, message } => {
                CompileError::MalformedTag { line, message }
            }
            ParseError::MalformedVariable { line, variable } => {
                CompileError::MalformedVariable { line, variable }
            }
        }
    }
}

struct DiagnosticList<'a>(&'a [Diagnostic]);

impl fmt::Display for DiagnosticList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

/// Errors raised while running a compiled render routine
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to serialize model: {0}")]
    Model(#[from] serde_json::Error),

    #[error("Failed to write to output: {0}")]
    Sink(#[from] fmt::Error),

    #[error("Expression {unit} failed: {source}")]
    Expression {
        unit: String,
        #[source]
        source: UnitError,
    },
}

/// Either half of `View::render`
#[derive(Error, Debug)]
pub enum ViewError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Render(#[from] RenderError),
}
