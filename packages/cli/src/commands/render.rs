use super::load_context;
use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use nhaml_compiler::View;
use nhaml_interpreter::Interpreter;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Template to render, relative to the working or views directory
    pub template: String,

    /// Layout template (overrides config)
    #[arg(short, long)]
    pub layout: Option<String>,

    /// JSON file holding the model (defaults to `{}`)
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Render without any layout
    #[arg(long)]
    pub no_layout: bool,
}

pub async fn render(args: RenderArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let context = load_context(
        &config,
        cwd,
        &args.template,
        args.layout.as_deref(),
        args.no_layout,
    )?;

    let model: Value = match &args.model {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read model {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?
        }
        None => Value::Object(Default::default()),
    };

    let view = View::new(
        context,
        Arc::new(Interpreter::new()),
        config.compiler_options.clone(),
    );
    let html = view.render_to_string(&model).await?;
    info!(template = %args.template, bytes = html.len(), "rendered template");
    println!("{}", html);

    Ok(())
}
