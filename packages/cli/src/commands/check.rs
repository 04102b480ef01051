use super::load_context;
use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use nhaml_compiler::{CompileError, Walker};
use nhaml_interpreter::{format_diagnostics, Interpreter};

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Template to check
    pub template: String,

    /// Layout template (overrides config)
    #[arg(short, long)]
    pub layout: Option<String>,

    /// Check without any layout
    #[arg(long)]
    pub no_layout: bool,
}

pub fn check(args: CheckArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let options = &config.compiler_options;

    println!("🔍 {} {}", "Checking".green().bold(), args.template);

    let context = load_context(
        &config,
        cwd,
        &args.template,
        args.layout.as_deref(),
        args.no_layout,
    )?;

    let walk = Walker::new(&context, "serde_json::Value", options.unit_sharing).walk_view()?;
    let program = walk.host.program_source();

    match walk.host.compile(&Interpreter::new(), &options.references) {
        Ok(units) => {
            println!(
                "   {} {} expression unit(s), {} partial(s)",
                "✓".green(),
                units.len(),
                context.parsed_partials()
            );
            Ok(())
        }
        Err(CompileError::CompilationFailed { diagnostics, .. }) => {
            eprintln!("{}", format_diagnostics(&program, &diagnostics));
            Err(anyhow!(
                "{} problem(s) in embedded expressions",
                diagnostics.len()
            ))
        }
        Err(err) => Err(err.into()),
    }
}
