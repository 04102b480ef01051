use crate::code_host::{BoolFn, EntryPoint, ResolvedUnits, TextFn};
use crate::error::{CompileError, CompileResult, RenderError};
use crate::ir::Op;
use serde_json::Value;
use std::fmt;

/// Lowered op with its callable bound in
enum Step {
    Write(String),
    Print {
        unit: String,
        call: TextFn,
    },
    Branch {
        unit: String,
        condition: BoolFn,
        then_steps: Vec<Step>,
        else_steps: Vec<Step>,
    },
}

/// Compiled render routine for one view and one model type
///
/// Immutable once built, so a single instance is shared between any
/// number of concurrent renders.
pub struct Renderer {
    model_type: String,
    steps: Vec<Step>,
    units: usize,
}

impl Renderer {
    /// Bind every unit handle in `ops` to its resolved entry point
    pub fn assemble(
        model_type: impl Into<String>,
        ops: &[Op],
        units: &ResolvedUnits,
    ) -> CompileResult<Self> {
        Ok(Self {
            model_type: model_type.into(),
            steps: lower(ops, units)?,
            units: units.len(),
        })
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    /// Number of distinct expression units behind this routine
    pub fn unit_count(&self) -> usize {
        self.units
    }

    /// Write the output for `model` into `sink`
    ///
    /// Expression failures abort the render; whatever was already written
    /// stays in the sink.
    pub fn render(&self, sink: &mut dyn fmt::Write, model: &Value) -> Result<(), RenderError> {
        run(&self.steps, sink, model)
    }

    /// Convenience wrapper collecting the output into a `String`
    pub fn render_to_string(&self, model: &Value) -> Result<String, RenderError> {
        let mut out = String::new();
        self.render(&mut out, model)?;
        Ok(out)
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("model_type", &self.model_type)
            .field("steps", &self.steps.len())
            .field("units", &self.units)
            .finish()
    }
}

fn lower(ops: &[Op], units: &ResolvedUnits) -> CompileResult<Vec<Step>> {
    let mut steps = Vec::with_capacity(ops.len());
    for op in ops {
        let step = match op {
            Op::StaticText(text) => Step::Write(text.clone()),
            Op::Expression(handle) => match units.get(*handle) {
                Some(EntryPoint::Text(call)) => Step::Print {
                    unit: units.name(*handle).to_string(),
                    call: call.clone(),
                },
                _ => return Err(unresolved(units.name(*handle))),
            },
            Op::Conditional {
                condition,
                then_ops,
                else_ops,
            } => match units.get(*condition) {
                Some(EntryPoint::Boolean(call)) => Step::Branch {
                    unit: units.name(*condition).to_string(),
                    condition: call.clone(),
                    then_steps: lower(then_ops, units)?,
                    else_steps: match else_ops {
                        Some(ops) => lower(ops, units)?,
                        None => Vec::new(),
                    },
                },
                _ => return Err(unresolved(units.name(*condition))),
            },
        };
        steps.push(step);
    }
    Ok(steps)
}

fn unresolved(unit: &str) -> CompileError {
    CompileError::Aborted(format!("unit {} has no entry point of the right kind", unit))
}

fn run(steps: &[Step], sink: &mut dyn fmt::Write, model: &Value) -> Result<(), RenderError> {
    for step in steps {
        match step {
            Step::Write(text) => sink.write_str(text)?,
            Step::Print { unit, call } => {
                let text = call(model).map_err(|source| RenderError::Expression {
                    unit: unit.clone(),
                    source,
                })?;
                sink.write_str(&text)?;
            }
            Step::Branch {
                unit,
                condition,
                then_steps,
                else_steps,
            } => {
                let taken = condition(model).map_err(|source| RenderError::Expression {
                    unit: unit.clone(),
                    source,
                })?;
                if taken {
                    run(then_steps, sink, model)?;
                } else {
                    run(else_steps, sink, model)?;
                }
            }
        }
    }
    Ok(())
}
