//! Session message model and agent wire-format conversion
//!
//! Messages are a tagged union (role × content variants) with an
//! explicit converter from the agent's line-delimited wire JSON, rather
//! than untyped key-value maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

/// Message payload variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    ToolResult {
        tool: String,
        output: String,
    },
}

/// One entry in a session's append-only message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BossMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
}

impl BossMessage {
    pub fn new(role: MessageRole, content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, MessageContent::Text { text: text.into() })
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(
            MessageRole::Assistant,
            MessageContent::Text { text: text.into() },
        )
    }

    /// Plain text content, when this message carries any
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Convert one line of agent output into a message
///
/// Agents emit line-delimited JSON in the shape
/// `{"type": "...", ...}`; anything that does not parse as a known
/// shape is kept as raw assistant text so no output is lost. Blank
/// lines produce nothing.
pub fn parse_agent_line(line: &str) -> Option<BossMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return Some(BossMessage::assistant(trimmed));
    };

    match value["type"].as_str() {
        Some("tool_call") | Some("tool_use") => {
            let tool = value["tool"]
                .as_str()
                .or_else(|| value["name"].as_str())
                .unwrap_or("unknown")
                .to_string();
            let args = value
                .get("args")
                .or_else(|| value.get("input"))
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            Some(BossMessage::new(
                MessageRole::Assistant,
                MessageContent::ToolCall { tool, args },
            ))
        }
        Some("tool_result") => {
            let tool = value["tool"]
                .as_str()
                .or_else(|| value["name"].as_str())
                .unwrap_or("unknown")
                .to_string();
            let output = value["output"]
                .as_str()
                .or_else(|| value["content"].as_str())
                .unwrap_or_default()
                .to_string();
            Some(BossMessage::new(
                MessageRole::Tool,
                MessageContent::ToolResult { tool, output },
            ))
        }
        Some("text") | Some("message") => {
            let text = value["text"]
                .as_str()
                .or_else(|| value["content"].as_str())
                .unwrap_or_default();
            if text.is_empty() {
                None
            } else {
                Some(BossMessage::assistant(text))
            }
        }
        _ => Some(BossMessage::assistant(trimmed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_call_line() {
        let line = r#"{"type": "tool_call", "tool": "write_file", "args": {"path": "index.html"}}"#;
        let message = parse_agent_line(line).unwrap();

        assert_eq!(message.role, MessageRole::Assistant);
        match message.content {
            MessageContent::ToolCall { tool, args } => {
                assert_eq!(tool, "write_file");
                assert_eq!(args["path"], "index.html");
            }
            other => panic!("Expected ToolCall, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_tool_result_line() {
        let line = r#"{"type": "tool_result", "tool": "run_shell", "output": "done"}"#;
        let message = parse_agent_line(line).unwrap();

        assert_eq!(message.role, MessageRole::Tool);
        assert_eq!(
            message.content,
            MessageContent::ToolResult {
                tool: "run_shell".to_string(),
                output: "done".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_text_line() {
        let message = parse_agent_line(r#"{"type": "text", "text": "thinking about it"}"#).unwrap();
        assert_eq!(message.text(), Some("thinking about it"));
    }

    #[test]
    fn test_non_json_falls_back_to_raw_text() {
        let message = parse_agent_line("npm WARN deprecated something").unwrap();
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.text(), Some("npm WARN deprecated something"));
    }

    #[test]
    fn test_blank_lines_are_dropped() {
        assert!(parse_agent_line("").is_none());
        assert!(parse_agent_line("   ").is_none());
    }

    #[test]
    fn test_message_serializes_in_camel_case() {
        let message = BossMessage::user("hello");
        let value = serde_json::to_value(&message).unwrap();
        assert!(value.get("createdAt").is_some());
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"]["type"], "text");
    }
}
