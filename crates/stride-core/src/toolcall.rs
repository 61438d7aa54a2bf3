//! Tool-call records and effect analysis.
//!
//! The model emits an unordered batch of tool calls per turn. Before
//! planning, each call is annotated with the logical resource it touches:
//! the absolute file path for single-file tools, or the absolute directory
//! for listings (the workspace root for `run_command`). The annotations are
//! advisory effect metadata for the planner; the dispatcher re-validates
//! confinement independently at execution time.

use std::path::{Component, Path, PathBuf};

use serde_json::Value;

/// One tool call from an assistant turn.
///
/// `id` is opaque but unique within the turn and correlates the eventual
/// result message. `path_abs`/`dir_abs` are filled in by [`annotate`].
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument text exactly as the model produced it.
    pub args: String,
    /// Absolute file path touched, for single-file tools.
    pub path_abs: Option<PathBuf>,
    /// Absolute directory observed, for listings; the root for `run_command`.
    pub dir_abs: Option<PathBuf>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args: args.into(),
            path_abs: None,
            dir_abs: None,
        }
    }
}

/// Lenient string-argument lookup: missing or non-string keys yield `""`.
pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Lexically normalize a path: drop `.` components and resolve `..` without
/// touching the filesystem, so paths to not-yet-existing files normalize too.
pub(crate) fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Join a model-supplied relative path under `root` and normalize it.
///
/// Leading separators are stripped first: the model's paths are always
/// interpreted relative to the workspace root, never as absolute paths.
pub(crate) fn join_under_root(root: &Path, rel: &str) -> PathBuf {
    clean(&root.join(rel.trim_start_matches('/')))
}

/// Annotate `call` with the resource it touches, derived purely from the
/// declared argument shape per tool name. Unknown tools keep both fields
/// empty, which leaves the planner free to schedule them anywhere; the
/// dispatcher rejects them at execution time.
pub fn annotate(root: &Path, call: &mut ToolCall) {
    let args: Value = serde_json::from_str(&call.args).unwrap_or(Value::Null);
    match call.name.as_str() {
        "read_file" | "write_file" | "delete_path" => {
            let path = str_arg(&args, "path");
            if !path.is_empty() {
                let abs = join_under_root(root, path);
                call.dir_abs = abs.parent().map(Path::to_path_buf);
                call.path_abs = Some(abs);
            }
        }
        "list_dir" | "list_dir_recursive" => {
            let dir = str_arg(&args, "dir");
            let dir = if dir.is_empty() { "." } else { dir };
            call.dir_abs = Some(join_under_root(root, dir));
        }
        "run_command" => {
            call.dir_abs = Some(root.to_path_buf());
        }
        _ => {}
    }
}
