//! System prompt and tool schema registration.
//!
//! The model-facing text lives in `prompts/*.md` and is embedded at compile
//! time; the parameter shapes here are the wire contract and must stay
//! stable.

use std::path::Path;

use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolType,
    FunctionObject,
};
use serde_json::json;

use crate::error::Result;

/// System prompt seeding model behavior for the whole run.
pub const SYSTEM_MESSAGE: &str = include_str!("../prompts/system_message.md");

const LIST_DIR: &str = include_str!("../prompts/list_dir.md");
const LIST_DIR_RECURSIVE: &str = include_str!("../prompts/list_dir_recursive.md");
const READ_FILE: &str = include_str!("../prompts/read_file.md");
const WRITE_FILE: &str = include_str!("../prompts/write_file.md");
const DELETE_PATH: &str = include_str!("../prompts/delete_path.md");
const RUN_COMMAND: &str = include_str!("../prompts/run_command.md");

/// Initial message log: system prompt, workspace root, task query.
pub fn initial_messages(root: &Path, query: &str) -> Result<Vec<ChatCompletionRequestMessage>> {
    Ok(vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_MESSAGE.to_string())
            .build()?
            .into(),
        ChatCompletionRequestUserMessageArgs::default()
            .content(format!("Source directory: {}", root.display()))
            .build()?
            .into(),
        ChatCompletionRequestUserMessageArgs::default()
            .content(query.to_string())
            .build()?
            .into(),
    ])
}

fn function_tool(name: &str, description: &str, parameters: serde_json::Value) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: name.to_string(),
            description: Some(description.to_string()),
            parameters: Some(parameters),
            strict: None,
        },
    }
}

/// Schemas for the six workspace tools, registered with the model each run.
pub fn tool_schemas() -> Vec<ChatCompletionTool> {
    vec![
        function_tool(
            "list_dir",
            LIST_DIR,
            json!({
                "type": "object",
                "properties": {
                    "dir": { "type": "string", "description": "relative directory path" }
                },
                "required": ["dir"]
            }),
        ),
        function_tool(
            "list_dir_recursive",
            LIST_DIR_RECURSIVE,
            json!({
                "type": "object",
                "properties": {
                    "dir": { "type": "string", "description": "relative directory path" }
                },
                "required": ["dir"]
            }),
        ),
        function_tool(
            "read_file",
            READ_FILE,
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "relative file path" }
                },
                "required": ["path"]
            }),
        ),
        function_tool(
            "write_file",
            WRITE_FILE,
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["path", "content"]
            }),
        ),
        function_tool(
            "delete_path",
            DELETE_PATH,
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" }
                },
                "required": ["path"]
            }),
        ),
        function_tool(
            "run_command",
            RUN_COMMAND,
            json!({
                "type": "object",
                "properties": {
                    "cmd": { "type": "string", "description": "shell command line" },
                    "permissions": { "type": "string", "description": "subset of rwx" },
                    "timeout": { "type": "string", "description": "duration such as 30s" }
                },
                "required": ["cmd", "permissions"]
            }),
        ),
    ]
}
