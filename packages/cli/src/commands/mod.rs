pub mod check;
pub mod render;

pub use check::{check, CheckArgs};
pub use render::{render, RenderArgs};

use crate::config::Config;
use anyhow::Result;
use nhaml_common::RealFileSystem;
use nhaml_compiler::RenderContext;
use std::sync::Arc;

/// Parse the main template and its layout as configured for `cwd`
pub(crate) fn load_context(
    config: &Config,
    cwd: &str,
    template: &str,
    layout: Option<&str>,
    no_layout: bool,
) -> Result<RenderContext> {
    let main = config.template_path(cwd, template);
    let layout = config.layout_path(cwd, layout, no_layout);

    let context = RenderContext::load(
        layout.as_deref(),
        &main,
        Arc::new(RealFileSystem),
        config.compiler_options.template_extension.clone(),
    )?;
    Ok(context)
}
