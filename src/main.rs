use anyhow::Context;
use clap::Parser;
use exscript::debugger::BREAK_ALWAYS;
use exscript::{Engine, EngineConfig};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "exscript")]
#[command(about = "Run Vim script files with the built-in debugger", long_about = None)]
struct Cli {
    /// Script to source
    script: Option<PathBuf>,

    /// Command to run after the script (repeatable)
    #[arg(short = 'c', value_name = "CMD")]
    commands: Vec<String>,

    /// Breakpoint, as for :breakadd (repeatable)
    #[arg(long = "break", value_name = "SPEC")]
    breakpoints: Vec<String>,

    /// Stop before the first command
    #[arg(long)]
    step: bool,

    /// JSON file with interpreter limits
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override 'maxfuncdepth'
    #[arg(long, value_name = "N")]
    max_func_depth: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(depth) = cli.max_func_depth {
        config.max_func_depth = depth;
    }
    debug!(?config, "starting");

    let mut engine = Engine::with_config(config);
    for spec in &cli.breakpoints {
        engine
            .add_breakpoint(spec)
            .with_context(|| format!("--break {}", spec))?;
    }
    if cli.step {
        engine.set_break_level(BREAK_ALWAYS);
    }

    if let Some(script) = &cli.script {
        engine
            .source_file(script)
            .with_context(|| format!("sourcing {}", script.display()))?;
    }
    for cmd in &cli.commands {
        engine.execute(cmd);
    }

    // Errors were already shown; only the exit status is left to set.
    if !engine.last_error().is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
