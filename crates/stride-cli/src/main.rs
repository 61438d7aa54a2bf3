//! CLI entry point for the stride coding agent.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stride_core::{Agent, Config, ToolChoice};

/// Iterative tool-calling coding agent.
///
/// Plans and executes filesystem tools iteratively to accomplish coding
/// tasks against a local source directory.
#[derive(Parser, Debug)]
#[command(
    name = "stride",
    version,
    about = "Iterative tool-calling coding agent",
    long_about = None,
    after_help = "Examples:\n  \
        stride --src . --concurrency 6 --steps 16 \"Create README.md and list the directory.\"\n  \
        stride --tool-choice required --require-tool write_file \"Write 'hello' to README.md and then read it.\"\n  \
        stride --tool-choice none \"Explain what this tool does.\""
)]
struct Args {
    /// Task prompt; free-form words are joined with spaces.
    #[arg(required = true)]
    prompt: Vec<String>,

    /// Source directory to operate in (defaults to current directory).
    #[arg(long, default_value = ".")]
    src: PathBuf,

    /// Max concurrent tool executions per phase.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Max assistant turns (avoids infinite loops).
    #[arg(long, default_value_t = 16)]
    steps: usize,

    /// OpenAI chat model (e.g. gpt-4o).
    #[arg(long, default_value = "gpt-4o")]
    model: String,

    /// Per-turn API timeout.
    #[arg(long, default_value = "600s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Enable pretty CLI progress logs.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    log: bool,

    /// Tool choice behavior: auto|required|none.
    #[arg(long, default_value = "auto", value_parser = ToolChoice::from_str)]
    tool_choice: ToolChoice,

    /// Require a specific tool to be used (repeatable).
    #[arg(long = "require-tool")]
    require_tool: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let src = std::fs::canonicalize(&args.src)
        .with_context(|| format!("resolve --src {}", args.src.display()))?;
    let prompt = args.prompt.join(" ").trim().to_string();
    if prompt.is_empty() {
        eprintln!("usage: stride [flags] \"task prompt\"");
        std::process::exit(2);
    }

    let config = Config {
        model: args.model,
        src,
        concurrency: args.concurrency,
        steps: args.steps,
        timeout: args.timeout,
        prompt,
        log: args.log,
        tool_choice: args.tool_choice,
        require_tools: args.require_tool,
    };

    let mut agent = Agent::new(config);
    agent.run().await?;
    Ok(())
}
