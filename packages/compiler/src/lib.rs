//! # NHaml Compiler
//!
//! Compiles a parsed layout + main template into a [`Renderer`] specialised
//! to one model type:
//!
//! 1. the [`Walker`] turns the node tree into IR, registering every
//!    embedded expression with the [`CodeHost`];
//! 2. all expressions go to the [`ExpressionCompiler`] in one batch;
//! 3. the IR is lowered into a render routine with the resolved entry
//!    points bound in.
//!
//! [`View`] caches the routine per model type and serialises concurrent
//! first compiles.

pub mod code_host;
pub mod context;
pub mod error;
pub mod ir;
pub mod options;
pub mod renderer;
pub mod view;
pub mod walker;

pub use code_host::{
    unit_name, BoolFn, CodeHost, CompileRequest, CompiledLibrary, Diagnostic, EntryPoint,
    ExpressionCompiler, ExpressionUnit, OutputKind, ResolvedUnits, ReturnKind, TextFn,
    UnitHandle,
};
pub use context::RenderContext;
pub use error::{CompileError, CompileResult, RenderError, UnitError, ViewError};
pub use ir::{IrBuilder, Op};
pub use options::{CompileOptions, UnitSharing};
pub use renderer::Renderer;
pub use view::{compile_view, View};
pub use walker::{WalkOutput, Walker};
