//! Session persistence inside a workspace
//!
//! Layout (all files live in the workspace root):
//! ```text
//! {workspace}/
//!   messages.jsonl      # append-only message log
//!   agent-name.txt      # which external agent owns this workspace
//!   session-token.txt   # the agent's resumable session token
//! ```
//!
//! These files are the only state needed to resume a session against
//! an existing workspace from a fresh coordinator.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::agent::AgentKind;
use crate::error::Result;
use crate::message::BossMessage;

pub const MESSAGES_FILE: &str = "messages.jsonl";
pub const AGENT_NAME_FILE: &str = "agent-name.txt";
pub const SESSION_TOKEN_FILE: &str = "session-token.txt";

/// Append one message to the workspace's message log
pub fn append_message(workspace: &Path, message: &BossMessage) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(workspace.join(MESSAGES_FILE))?;

    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", serde_json::to_string(message)?)?;
    writer.flush()?;

    debug!("Appended message {} to {:?}", message.id, workspace);
    Ok(())
}

/// Load the full message log of a workspace
///
/// Missing file means no messages yet. Unparseable lines are warned
/// and skipped so one corrupt entry never loses the rest of the log.
pub fn load_messages(workspace: &Path) -> Result<Vec<BossMessage>> {
    let path = workspace.join(MESSAGES_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(&path)?);
    let mut messages = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("Failed to read line {} in {:?}: {}", line_num, path, e);
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<BossMessage>(&line) {
            Ok(message) => messages.push(message),
            Err(e) => {
                warn!(
                    "Skipping unparseable message at line {} in {:?}: {}",
                    line_num, path, e
                );
            }
        }
    }

    debug!("Loaded {} messages from {:?}", messages.len(), workspace);
    Ok(messages)
}

/// Record which agent owns this workspace
pub fn write_agent_name(workspace: &Path, kind: AgentKind) -> Result<()> {
    std::fs::write(workspace.join(AGENT_NAME_FILE), kind.as_str())?;
    Ok(())
}

/// The agent recorded as owning this workspace, if any
pub fn read_agent_name(workspace: &Path) -> Option<AgentKind> {
    let content = std::fs::read_to_string(workspace.join(AGENT_NAME_FILE)).ok()?;
    match AgentKind::from_str(content.trim()) {
        Ok(kind) => Some(kind),
        Err(_) => {
            warn!(
                "Unrecognized agent name {:?} in {:?}",
                content.trim(),
                workspace
            );
            None
        }
    }
}

/// The agent's resumable session token, if it has written one
pub fn read_session_token(workspace: &Path) -> Option<String> {
    let content = std::fs::read_to_string(workspace.join(SESSION_TOKEN_FILE)).ok()?;
    let token = content.trim().to_string();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_load_messages() {
        let dir = TempDir::new().unwrap();

        append_message(dir.path(), &BossMessage::user("first")).unwrap();
        append_message(dir.path(), &BossMessage::assistant("second")).unwrap();

        let messages = load_messages(dir.path()).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), Some("first"));
        assert_eq!(messages[1].text(), Some("second"));
    }

    #[test]
    fn test_load_messages_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(load_messages(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_load_messages_skips_corrupt_lines() {
        let dir = TempDir::new().unwrap();
        append_message(dir.path(), &BossMessage::user("kept")).unwrap();

        // Inject garbage between valid entries
        let path = dir.path().join(MESSAGES_FILE);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{not valid json\n");
        std::fs::write(&path, content).unwrap();
        append_message(dir.path(), &BossMessage::user("also kept")).unwrap();

        let messages = load_messages(dir.path()).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), Some("kept"));
        assert_eq!(messages[1].text(), Some("also kept"));
    }

    #[test]
    fn test_agent_name_round_trip() {
        let dir = TempDir::new().unwrap();

        assert!(read_agent_name(dir.path()).is_none());
        write_agent_name(dir.path(), AgentKind::ClaudeCode).unwrap();
        assert_eq!(read_agent_name(dir.path()), Some(AgentKind::ClaudeCode));
    }

    #[test]
    fn test_unknown_agent_name_is_none() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(AGENT_NAME_FILE), "mystery-agent").unwrap();
        assert!(read_agent_name(dir.path()).is_none());
    }

    #[test]
    fn test_session_token_trims_whitespace() {
        let dir = TempDir::new().unwrap();

        assert!(read_session_token(dir.path()).is_none());
        std::fs::write(dir.path().join(SESSION_TOKEN_FILE), "tok-42\n").unwrap();
        assert_eq!(read_session_token(dir.path()).as_deref(), Some("tok-42"));

        std::fs::write(dir.path().join(SESSION_TOKEN_FILE), "   \n").unwrap();
        assert!(read_session_token(dir.path()).is_none());
    }
}
