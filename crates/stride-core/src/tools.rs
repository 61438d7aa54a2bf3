//! Workspace tool dispatcher.
//!
//! Executes one named tool against the workspace. Every path argument is
//! confined: joined under the root, lexically normalized, and refused if it
//! escapes. Reads and listings take the shared side of the per-path lock;
//! writes and deletes take the exclusive side. Failures are returned as
//! [`ToolCallError`] values for the model to react to; nothing here aborts
//! the run.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use crate::error::ToolCallError;
use crate::locks::{write_atomic, LockRegistry};
use crate::progress::{Progress, Span};
use crate::shell;
use crate::toolcall::{join_under_root, str_arg};

/// Dispatch seam between the phase executor and the concrete toolbox.
///
/// Tests script this trait to exercise scheduling without touching the
/// filesystem.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Execute one named tool with raw JSON arguments and return its
    /// textual result.
    async fn dispatch(&self, name: &str, raw_args: &str) -> Result<String, ToolCallError>;
}

/// The six workspace tools plus the state they share: the confinement root,
/// the per-path lock registry, and the progress printer.
pub struct Toolbox {
    root: PathBuf,
    locks: LockRegistry,
    progress: Arc<Progress>,
}

fn report(span: &Span, err: impl Display) -> ToolCallError {
    let msg = err.to_string();
    span.error(&msg);
    ToolCallError::RespondToModel(msg)
}

/// Direct entries of `dir` as `(file_name, is_dir)`, sorted by name.
async fn sorted_entries(dir: &Path) -> std::io::Result<Vec<(String, bool)>> {
    let mut reader = fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let is_dir = entry.file_type().await?.is_dir();
        entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
    }
    entries.sort();
    Ok(entries)
}

impl Toolbox {
    pub fn new(root: PathBuf, progress: Arc<Progress>) -> Self {
        Self {
            root,
            locks: LockRegistry::new(),
            progress,
        }
    }

    /// Confine a model-supplied path under the workspace root.
    fn resolve(&self, rel: &str) -> Result<PathBuf, ToolCallError> {
        if rel.is_empty() {
            return Err(ToolCallError::RespondToModel("path required".to_string()));
        }
        let abs = join_under_root(&self.root, rel);
        if !abs.starts_with(&self.root) {
            return Err(ToolCallError::RespondToModel(
                "refusing to access outside source directory".to_string(),
            ));
        }
        Ok(abs)
    }

    async fn list_dir(&self, args: &Value) -> Result<String, ToolCallError> {
        let dir = str_arg(args, "dir");
        let span = self.progress.start("list_dir", dir);
        let dir = if dir.is_empty() { "." } else { dir };
        let abs = self.resolve(dir)?;
        let lock = self.locks.lock_for(&abs);
        let _guard = lock.read().await;

        let entries = sorted_entries(&abs).await.map_err(|err| report(&span, err))?;
        let mut out = String::new();
        for (name, is_dir) in &entries {
            out.push_str(if *is_dir { "DIR  " } else { "FILE " });
            out.push_str(name);
            out.push('\n');
        }
        span.success(&format!("{} entries", entries.len()));
        Ok(out)
    }

    async fn list_dir_recursive(&self, args: &Value) -> Result<String, ToolCallError> {
        let dir = str_arg(args, "dir");
        let span = self.progress.start("list_dir_recursive", dir);
        let dir = if dir.is_empty() { "." } else { dir };
        let abs = self.resolve(dir)?;
        let lock = self.locks.lock_for(&abs);
        let _guard = lock.read().await;

        // Depth-first pre-order with sorted children: push each directory's
        // entries reversed so the stack pops them in name order.
        let mut lines = Vec::new();
        let mut stack: Vec<(PathBuf, bool)> = Vec::new();
        let top = sorted_entries(&abs).await.map_err(|err| report(&span, err))?;
        for (name, is_dir) in top.into_iter().rev() {
            stack.push((abs.join(name), is_dir));
        }
        while let Some((path, is_dir)) = stack.pop() {
            let rel = path
                .strip_prefix(&abs)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            if is_dir {
                lines.push(format!("DIR  {rel}"));
                let children = sorted_entries(&path).await.map_err(|err| report(&span, err))?;
                for (name, is_dir) in children.into_iter().rev() {
                    stack.push((path.join(name), is_dir));
                }
            } else {
                lines.push(format!("FILE {rel}"));
            }
        }
        span.success(&format!("{} entries", lines.len()));
        Ok(lines.join("\n"))
    }

    async fn read_file(&self, args: &Value) -> Result<String, ToolCallError> {
        let path = str_arg(args, "path");
        let span = self.progress.start("read_file", path);
        let abs = self.resolve(path)?;
        let lock = self.locks.lock_for(&abs);
        let _guard = lock.read().await;

        let bytes = fs::read(&abs).await.map_err(|err| report(&span, err))?;
        span.success(&format!("{} bytes", bytes.len()));
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn write_file(&self, args: &Value) -> Result<String, ToolCallError> {
        let path = str_arg(args, "path");
        let span = self.progress.start("write_file", path);
        let content = str_arg(args, "content");
        let abs = self.resolve(path)?;
        let lock = self.locks.lock_for(&abs);
        let _guard = lock.write().await;

        write_atomic(&abs, content.as_bytes())
            .await
            .map_err(|err| report(&span, err))?;
        span.success(&format!("{} bytes", content.len()));
        Ok(format!("wrote {} ({} bytes)", path, content.len()))
    }

    async fn delete_path(&self, args: &Value) -> Result<String, ToolCallError> {
        let path = str_arg(args, "path");
        let span = self.progress.start("delete_path", path);
        let abs = self.resolve(path)?;
        let lock = self.locks.lock_for(&abs);
        let _guard = lock.write().await;

        let removed = match fs::symlink_metadata(&abs).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&abs).await,
            Ok(_) => fs::remove_file(&abs).await,
            // Deleting something already gone is not an error.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        };
        removed.map_err(|err| report(&span, err))?;
        span.success("deleted");
        Ok(format!("deleted {path}"))
    }
}

#[async_trait]
impl Dispatch for Toolbox {
    async fn dispatch(&self, name: &str, raw_args: &str) -> Result<String, ToolCallError> {
        let args: Value = serde_json::from_str(raw_args).unwrap_or(Value::Null);
        match name {
            "list_dir" => self.list_dir(&args).await,
            "list_dir_recursive" => self.list_dir_recursive(&args).await,
            "read_file" => self.read_file(&args).await,
            "write_file" => self.write_file(&args).await,
            "delete_path" => self.delete_path(&args).await,
            "run_command" => shell::run_command(&self.root, &args, &self.progress).await,
            other => Err(ToolCallError::RespondToModel(format!(
                "unknown tool: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn toolbox(root: &Path) -> Toolbox {
        Toolbox::new(root.to_path_buf(), Arc::new(Progress::new(false)))
    }

    #[tokio::test]
    async fn resolve_refuses_escapes() {
        let temp = TempDir::new().expect("tempdir");
        let tools = toolbox(temp.path());
        let err = tools
            .dispatch("read_file", r#"{"path":"../outside.txt"}"#)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside source directory"));
    }

    #[tokio::test]
    async fn resolve_requires_a_path() {
        let temp = TempDir::new().expect("tempdir");
        let tools = toolbox(temp.path());
        let err = tools.dispatch("read_file", r#"{}"#).await.unwrap_err();
        assert_eq!(err.to_string(), "path required");
    }

    #[tokio::test]
    async fn dotted_paths_inside_the_root_are_fine() {
        let temp = TempDir::new().expect("tempdir");
        std::fs::create_dir(temp.path().join("a")).expect("mkdir");
        std::fs::write(temp.path().join("target.txt"), "ok").expect("seed");
        let tools = toolbox(temp.path());
        let out = tools
            .dispatch("read_file", r#"{"path":"a/../target.txt"}"#)
            .await
            .expect("read");
        assert_eq!(out, "ok");
    }

    #[tokio::test]
    async fn list_dir_formats_and_sorts_entries() {
        let temp = TempDir::new().expect("tempdir");
        std::fs::create_dir(temp.path().join("sub")).expect("mkdir");
        std::fs::write(temp.path().join("b.txt"), "b").expect("seed");
        std::fs::write(temp.path().join("a.txt"), "a").expect("seed");
        let tools = toolbox(temp.path());
        let out = tools.dispatch("list_dir", r#"{"dir":"."}"#).await.expect("list");
        assert_eq!(out, "FILE a.txt\nFILE b.txt\nDIR  sub\n");
    }

    #[tokio::test]
    async fn missing_file_is_a_model_visible_error() {
        let temp = TempDir::new().expect("tempdir");
        let tools = toolbox(temp.path());
        let err = tools
            .dispatch("read_file", r#"{"path":"ghost.txt"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolCallError::RespondToModel(_)));
    }

    #[tokio::test]
    async fn delete_of_missing_path_succeeds() {
        let temp = TempDir::new().expect("tempdir");
        let tools = toolbox(temp.path());
        let out = tools
            .dispatch("delete_path", r#"{"path":"never-existed"}"#)
            .await
            .expect("delete");
        assert_eq!(out, "deleted never-existed");
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let tools = toolbox(temp.path());
        let err = tools.dispatch("teleport", "{}").await.unwrap_err();
        assert_eq!(err.to_string(), "unknown tool: teleport");
    }
}
