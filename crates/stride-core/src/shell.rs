//! The `run_command` tool: permission gates and subprocess execution.
//!
//! Three independent checks run against the raw command string before
//! anything is spawned:
//!
//! 1. an unconditional denylist of network and privilege tokens;
//! 2. a mutation gate: commands containing write-shaped tokens need `w`
//!    in the `permissions` argument;
//! 3. a path-exec gate: a first token containing `/` needs `x`.
//!
//! Matching is by substring with no word boundaries: a denylisted token
//! inside a file path also trips the gate, and the model has to rephrase.
//!
//! Execution is `bash -lc <cmd>` in the workspace root with the inherited
//! environment. Output is stdout followed by stderr, truncated at
//! [`MAX_OUTPUT_BYTES`]; timeouts kill the child and report the partial
//! output.

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use crate::error::ToolCallError;
use crate::progress::Progress;
use crate::toolcall::str_arg;

/// Tokens that refuse execution regardless of granted permissions.
const DENYLIST: [&str; 11] = [
    "sudo", "mount", "umount", "iptables", "ifconfig", "ssh", "scp", "curl", "wget", "nc",
    "rm -rf /",
];

/// Substrings that mark a command as mutating the workspace.
const WRITE_TOKENS: [&str; 14] = [
    "rm ",
    "mv ",
    "cp ",
    "chmod ",
    "chown ",
    "git commit",
    "git add",
    "git reset",
    "git revert",
    "go mod tidy",
    "sed -i",
    "tee ",
    ">",
    ">>",
];

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Combined output beyond this many bytes is cut with a truncation marker.
pub const MAX_OUTPUT_BYTES: usize = 4000;

fn first_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([a-zA-Z0-9_./-]+)").expect("first-token regex"))
}

/// Validate the command string against the denylist and permission gates.
pub(crate) fn check_policy(cmdline: &str, permissions: &str) -> Result<(), ToolCallError> {
    for token in DENYLIST {
        if cmdline.contains(token) {
            return Err(ToolCallError::Denied(format!(
                "command contains disallowed token: {token}"
            )));
        }
    }

    let allow_write = permissions.contains('w');
    let allow_exec = permissions.contains('x');

    if WRITE_TOKENS.iter().any(|token| cmdline.contains(token)) && !allow_write {
        return Err(ToolCallError::Denied(
            "write permissions required (use permissions contains 'w')".to_string(),
        ));
    }

    let exec_binary = first_token_re()
        .captures(cmdline)
        .is_some_and(|caps| caps[1].contains('/'));
    if exec_binary && !allow_exec {
        return Err(ToolCallError::Denied(
            "execute permissions required (include 'x') for running binaries by path".to_string(),
        ));
    }

    Ok(())
}

/// Parse the model-supplied timeout; defaults to 60s, clamped to 5 minutes.
pub(crate) fn command_timeout(raw: &str) -> Duration {
    if raw.is_empty() {
        return DEFAULT_TIMEOUT;
    }
    match humantime::parse_duration(raw) {
        Ok(parsed) if parsed > Duration::ZERO => parsed.min(MAX_TIMEOUT),
        _ => DEFAULT_TIMEOUT,
    }
}

fn truncate_output(bytes: &[u8]) -> String {
    if bytes.len() > MAX_OUTPUT_BYTES {
        format!(
            "{}\n...[truncated]",
            String::from_utf8_lossy(&bytes[..MAX_OUTPUT_BYTES])
        )
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

async fn drain<R>(pipe: Option<R>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

/// Execute `run_command` against the workspace root.
pub(crate) async fn run_command(
    root: &Path,
    args: &Value,
    progress: &Progress,
) -> Result<String, ToolCallError> {
    let cmdline = str_arg(args, "cmd");
    let permissions = str_arg(args, "permissions");
    if cmdline.is_empty() {
        return Err(ToolCallError::RespondToModel("cmd required".to_string()));
    }
    let span = progress.start("run_command", cmdline);

    check_policy(cmdline, permissions)?;
    let deadline = command_timeout(str_arg(args, "timeout"));
    debug!(cmd = cmdline, timeout = ?deadline, "spawning shell command");

    let mut child = Command::new("bash")
        .arg("-lc")
        .arg(cmdline)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| {
            span.error(&err.to_string());
            ToolCallError::RespondToModel(err.to_string())
        })?;

    // Drain both pipes off-task so a killed child can't deadlock on a full
    // pipe buffer; the readers finish once the write ends close.
    let stdout_task = tokio::spawn(drain(child.stdout.take()));
    let stderr_task = tokio::spawn(drain(child.stderr.take()));

    let status = match tokio::time::timeout(deadline, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(err)) => {
            span.error(&err.to_string());
            return Err(ToolCallError::RespondToModel(err.to_string()));
        }
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            None
        }
    };

    let mut combined = stdout_task.await.unwrap_or_default();
    combined.extend(stderr_task.await.unwrap_or_default());
    let text = truncate_output(&combined);

    match status {
        None => {
            span.error("timeout");
            Err(ToolCallError::RespondToModel(format!("{text}\n(timeout)")))
        }
        Some(status) if !status.success() => {
            let marker = match status.code() {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            };
            span.error(&marker);
            Err(ToolCallError::RespondToModel(format!("{text}\n({marker})")))
        }
        Some(_) => {
            span.success("ok");
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denylist_rejects_regardless_of_permissions() {
        let err = check_policy("curl https://example.com", "rwx").unwrap_err();
        assert!(matches!(err, ToolCallError::Denied(_)));
        assert!(err.to_string().contains("curl"));
    }

    #[test]
    fn denylist_matches_inside_longer_strings() {
        // Substring match, no word boundary.
        assert!(check_policy("cat notes-about-ssh.txt", "r").is_err());
    }

    #[test]
    fn write_tokens_require_w() {
        assert!(check_policy("echo hi > f.txt", "r").is_err());
        assert!(check_policy("echo hi > f.txt", "rw").is_ok());
        assert!(check_policy("git add -A", "r").is_err());
        assert!(check_policy("git add -A", "w").is_ok());
    }

    #[test]
    fn plain_reads_need_no_permissions() {
        assert!(check_policy("echo hello", "").is_ok());
        assert!(check_policy("ls -la", "r").is_ok());
    }

    #[test]
    fn path_exec_requires_x() {
        assert!(check_policy("./tool.sh", "r").is_err());
        assert!(check_policy("./tool.sh", "rx").is_ok());
        assert!(check_policy("scripts/build.sh", "r").is_err());
        // Bare command names carry no slash and need no x.
        assert!(check_policy("make test", "r").is_ok());
    }

    #[test]
    fn first_token_only_gates_exec() {
        // The slash sits in an argument, not the executed binary.
        assert!(check_policy("cat a/b.txt", "r").is_ok());
    }

    #[test]
    fn timeout_parsing_defaults_and_clamps() {
        assert_eq!(command_timeout(""), Duration::from_secs(60));
        assert_eq!(command_timeout("not a duration"), Duration::from_secs(60));
        assert_eq!(command_timeout("200ms"), Duration::from_millis(200));
        assert_eq!(command_timeout("2m"), Duration::from_secs(120));
        assert_eq!(command_timeout("30m"), Duration::from_secs(300));
    }

    #[test]
    fn truncation_appends_marker_past_the_cap() {
        let long = vec![b'x'; MAX_OUTPUT_BYTES + 100];
        let text = truncate_output(&long);
        assert!(text.ends_with("\n...[truncated]"));
        assert!(text.starts_with('x'));

        let short = b"small".to_vec();
        assert_eq!(truncate_output(&short), "small");
    }
}
