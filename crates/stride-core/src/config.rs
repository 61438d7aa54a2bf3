//! Runtime configuration for one agent run.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Tool-choice policy forwarded to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolChoice {
    /// The model decides whether to call tools.
    #[default]
    Auto,
    /// The model must call at least one tool per turn.
    Required,
    /// The model may not call tools.
    None,
}

impl FromStr for ToolChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "required" => Ok(Self::Required),
            "none" => Ok(Self::None),
            other => Err(format!(
                "invalid tool choice {other:?} (expected auto|required|none)"
            )),
        }
    }
}

impl fmt::Display for ToolChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Required => "required",
            Self::None => "none",
        };
        write!(f, "{name}")
    }
}

/// Configuration carried for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat model identifier (e.g. `gpt-4o`).
    pub model: String,
    /// Canonicalized workspace root; the confinement boundary for every tool.
    pub src: PathBuf,
    /// Maximum concurrent tool executions per phase.
    pub concurrency: usize,
    /// Maximum assistant turns before the run fails.
    pub steps: usize,
    /// Per-turn API timeout.
    pub timeout: Duration,
    /// The natural-language task.
    pub prompt: String,
    /// Whether to print human-readable progress.
    pub log: bool,
    /// Tool-choice policy forwarded to the model.
    pub tool_choice: ToolChoice,
    /// Tool names the model is required to call during the run.
    pub require_tools: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_choice_round_trips() {
        for name in ["auto", "required", "none"] {
            let parsed: ToolChoice = name.parse().expect("parse");
            assert_eq!(parsed.to_string(), name);
        }
    }

    #[test]
    fn tool_choice_rejects_unknown() {
        let err = "sometimes".parse::<ToolChoice>().unwrap_err();
        assert!(err.contains("invalid tool choice"));
    }
}
