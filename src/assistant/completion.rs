//! Completion services: something that turns a conversation into a reply

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::transform::extract_descriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sent as JSON on the service's stdin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    /// Screenshot to show alongside the first user message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
}

/// Blocking; callers run it off the event loop
pub trait CompletionService: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Runs an external program per request: request JSON on stdin, reply text
/// on stdout.
pub struct CommandCompletion {
    program: String,
    args: Vec<String>,
}

impl CommandCompletion {
    /// `None` for an empty argv
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl CompletionService for CommandCompletion {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let payload = serde_json::to_vec(request)?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run {}", self.program))?;

        {
            let mut stdin = child.stdin.take().context("child stdin unavailable")?;
            stdin
                .write_all(&payload)
                .with_context(|| format!("Failed to send request to {}", self.program))?;
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("Failed to wait for {}", self.program))?;
        if !output.status.success() {
            bail!(
                "{} failed ({}): {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let reply = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if reply.is_empty() {
            bail!("{} returned an empty reply", self.program);
        }
        Ok(reply)
    }
}

/// Offline responder. Echoes a transform the operator typed as JSON and
/// otherwise just acknowledges.
pub struct EchoCompletion;

impl CompletionService for EchoCompletion {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let last = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .context("no user message in request")?;
        Ok(match extract_descriptor(&last.content) {
            Some(descriptor) => format!(
                "Applying {}.\n```json\n{}\n```",
                descriptor.summary(),
                serde_json::to_string(&descriptor)?
            ),
            None => "No completion service is configured. Type the transform itself as a JSON \
                     object with a \"type\" field, or use :apply to only clear the sentinel."
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformKind;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            system: "rules".into(),
            messages: vec![ChatMessage::user(text)],
            image: None,
        }
    }

    #[test]
    fn test_echo_round_trips_descriptor() {
        let reply = EchoCompletion
            .complete(&request(r#"flip it {"type": "arc_flip_y", "circle_indices": [2]}"#))
            .unwrap();
        let descriptor = extract_descriptor(&reply).unwrap();
        assert_eq!(descriptor.kind, TransformKind::ArcFlipY);
        assert_eq!(descriptor.arc_indices.unwrap().into_iter().collect::<Vec<_>>(), [2]);
    }

    #[test]
    fn test_echo_without_descriptor() {
        let reply = EchoCompletion.complete(&request("make it nicer")).unwrap();
        assert!(extract_descriptor(&reply).is_none());
    }

    #[test]
    fn test_empty_argv() {
        assert!(CommandCompletion::from_argv(&[]).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_reads_stdout() {
        let service = CommandCompletion::from_argv(&[
            "sh".into(),
            "-c".into(),
            "cat > /dev/null; echo '{\"type\": \"mirror_x\"}'".into(),
        ])
        .unwrap();
        let reply = service.complete(&request("mirror")).unwrap();
        assert_eq!(extract_descriptor(&reply).unwrap().kind, TransformKind::MirrorX);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failure_surfaces() {
        let service = CommandCompletion::from_argv(&[
            "sh".into(),
            "-c".into(),
            "cat > /dev/null; echo boom >&2; exit 3".into(),
        ])
        .unwrap();
        let err = service.complete(&request("mirror")).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_request_json_shape() {
        let json = serde_json::to_value(request("hi")).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("image").is_none());
    }
}
