//! # NHaml Interpreter
//!
//! An [`ExpressionCompiler`] that parses the generated expression program
//! and hands back tree-walking closures as entry points.
//!
//! ```rust
//! use nhaml_compiler::{CodeHost, ReturnKind, UnitSharing};
//! use nhaml_interpreter::Interpreter;
//!
//! let mut host = CodeHost::new("Page", UnitSharing::Dedupe);
//! let unit = host.register("upper(model.name)", ReturnKind::Text, 1);
//! let units = host.compile(&Interpreter::new(), &["core".to_string()]).unwrap();
//! assert_eq!(units.len(), 1);
//! # let _ = unit;
//! ```

pub mod ast;
pub mod builtins;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use eval::{to_text, EvalError, EvalResult};

use ast::FunctionDecl;
use builtins::FunctionTable;
use nhaml_compiler::{
    CompileRequest, CompiledLibrary, Diagnostic, EntryPoint, ExpressionCompiler, ReturnKind,
    UnitError,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Interpreting expression compiler
#[derive(Debug, Default, Clone)]
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionCompiler for Interpreter {
    #[instrument(skip_all, fields(model_type = request.model_type, bytes = request.source.len()))]
    fn compile(
        &self,
        request: &CompileRequest<'_>,
    ) -> Result<Box<dyn CompiledLibrary>, Vec<Diagnostic>> {
        let mut diagnostics = Vec::new();
        let mut table = FunctionTable::new();
        for reference in request.references {
            match builtins::library(reference) {
                Some(library) => table.import(library),
                None => diagnostics.push(Diagnostic::new(
                    0,
                    format!("Unknown library reference `{}`", reference),
                )),
            }
        }

        let (decls, errors) = parser::parse_program(request.source, &table);
        diagnostics.extend(errors);

        let mut functions = HashMap::with_capacity(decls.len());
        for decl in decls {
            if functions.contains_key(&decl.name) {
                diagnostics.push(
                    Diagnostic::new(
                        parser::line_of(request.source, decl.span.start),
                        format!("Duplicate function `{}`", decl.name),
                    )
                    .with_unit(decl.name.clone())
                    .with_span(decl.span.clone()),
                );
                continue;
            }
            let name = decl.name.clone();
            functions.insert(name, entry_point(decl));
        }

        if !diagnostics.is_empty() {
            warn!(count = diagnostics.len(), "expression program rejected");
            return Err(diagnostics);
        }

        debug!(functions = functions.len(), "expression program compiled");
        Ok(Box::new(Program { functions }))
    }
}

struct Program {
    functions: HashMap<String, EntryPoint>,
}

impl CompiledLibrary for Program {
    fn entry_point(&self, name: &str) -> Option<EntryPoint> {
        self.functions.get(name).cloned()
    }
}

fn entry_point(decl: FunctionDecl) -> EntryPoint {
    let body = Arc::new(decl.body);
    match decl.kind {
        ReturnKind::Text => EntryPoint::Text(Arc::new(
            move |model: &Value| -> Result<String, UnitError> {
                Ok(to_text(&eval::evaluate(&body, model)?))
            },
        )),
        ReturnKind::Boolean => EntryPoint::Boolean(Arc::new(
            move |model: &Value| -> Result<bool, UnitError> {
                match eval::evaluate(&body, model)? {
                    Value::Bool(b) => Ok(b),
                    other => Err(EvalError::TypeMismatch {
                        expected: "bool",
                        found: eval::type_name(&other),
                    }
                    .into()),
                }
            },
        )),
    }
}

/// Pretty-print diagnostics against the program they refer to
pub fn format_diagnostics(source: &str, diagnostics: &[Diagnostic]) -> String {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let filename = "<expressions>";
    let mut output = Vec::new();

    for diagnostic in diagnostics {
        let span = diagnostic.span.clone().unwrap_or(0..0);

        let label = match (&diagnostic.unit, diagnostic.template_line) {
            (Some(unit), Some(line)) => format!("in {} (template line {})", unit, line),
            (Some(unit), None) => format!("in {}", unit),
            (None, _) => diagnostic.message.clone(),
        };

        let report = Report::build(ReportKind::Error, filename, span.start)
            .with_message(&diagnostic.message)
            .with_label(
                Label::new((filename, span))
                    .with_color(Color::Red)
                    .with_message(label),
            )
            .finish();

        if report
            .write((filename, Source::from(source)), &mut output)
            .is_err()
        {
            output.extend_from_slice(diagnostic.to_string().as_bytes());
            output.push(b'\n');
        }
    }

    String::from_utf8_lossy(&output).into_owned()
}

#[cfg(test)]
mod tests;
