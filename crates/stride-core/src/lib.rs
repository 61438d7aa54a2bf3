//! Core engine for the stride coding agent.
//!
//! The agent repeatedly asks a chat model for a batch of tool calls against
//! a confined workspace, orders the batch into dependency-respecting phases,
//! executes each phase with bounded parallelism under per-path locking, and
//! feeds the textual results back as the next turn's context.
//!
//! Module map:
//!
//! - [`locks`]: per-path reader/writer lock registry and atomic file writes
//! - [`tools`]: the six workspace tools behind the [`tools::Dispatch`] seam
//! - [`shell`]: `run_command` permission gates and subprocess handling
//! - [`toolcall`]: tool-call records and effect analysis
//! - [`planner`]: effect graph construction and phase layering
//! - [`executor`]: sequential phases, concurrent calls within a phase
//! - [`agent`]: the turn loop against the OpenAI chat completions API

pub mod agent;
pub mod config;
pub mod error;
pub mod executor;
pub mod locks;
pub mod planner;
pub mod progress;
pub mod prompt;
pub mod shell;
pub mod toolcall;
pub mod tools;

pub use agent::Agent;
pub use config::{Config, ToolChoice};
pub use error::{Error, Result, ToolCallError};
