//! Human-readable progress reporting.
//!
//! Product-facing output on stderr, kept separate from the `tracing`
//! diagnostics: a startup banner, one line when a tool starts, one when it
//! finishes with elapsed time, and the final assistant block.

use std::time::{Duration, Instant};

use colored::Colorize;

use crate::config::Config;

/// Progress printer; a disabled instance swallows everything except the
/// final assistant reply, which then falls back to plain stdout.
pub struct Progress {
    enabled: bool,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn info(&self, msg: &str) {
        if self.enabled {
            eprintln!("{} {}", "ℹ".dimmed(), msg.dimmed());
        }
    }

    /// Startup banner with the effective run settings.
    pub fn banner(&self, config: &Config) {
        if !self.enabled {
            return;
        }
        self.info("");
        self.info(&format!("  Using model: {}", config.model));
        self.info(&format!("  Current src: {}", config.src.display()));
        self.info(&format!("  Max steps  : {}", config.steps));
        self.info(&format!(
            "  Timeout    : {}",
            humantime::format_duration(config.timeout)
        ));
        self.info(&format!("  Concurrency: {}", config.concurrency));
        self.info(&format!("  Tool choice: {}", config.tool_choice));
        if !config.require_tools.is_empty() {
            self.info(&format!("  Need tools : {}", config.require_tools.join(", ")));
        }
        self.info("");
    }

    /// Begin a tool span; the start line prints immediately and the span
    /// prints the completion line with elapsed time.
    pub fn start(&self, tool: &str, target: &str) -> Span {
        if self.enabled {
            eprintln!("{} {}", tool.magenta().bold(), target.cyan());
        }
        Span {
            enabled: self.enabled,
            tool: tool.to_string(),
            started: Instant::now(),
        }
    }

    /// Print the assistant's final reply.
    pub fn assistant(&self, content: &str) {
        if self.enabled {
            eprintln!("{}", "\n--- ASSISTANT ---".magenta().bold());
            eprintln!("{content}");
        } else {
            println!("\n--- ASSISTANT ---\n{content}");
        }
    }
}

/// Completion handle for one tool invocation.
pub struct Span {
    enabled: bool,
    tool: String,
    started: Instant,
}

impl Span {
    pub fn success(&self, msg: &str) {
        if !self.enabled {
            return;
        }
        eprintln!(
            "{} {} ({}) {}",
            "✓".green().bold(),
            self.tool.magenta().bold(),
            format_elapsed(self.started),
            msg
        );
    }

    pub fn error(&self, msg: &str) {
        if !self.enabled {
            return;
        }
        eprintln!(
            "{} {} ({}) {}",
            "✗".red().bold(),
            self.tool.magenta().bold(),
            format_elapsed(self.started),
            msg.red()
        );
    }
}

fn format_elapsed(started: Instant) -> String {
    // Millisecond resolution is plenty for tool spans.
    let elapsed = started.elapsed();
    format!("{:?}", Duration::from_millis(elapsed.as_millis() as u64))
}
