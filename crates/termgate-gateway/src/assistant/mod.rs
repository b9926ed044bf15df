//! Natural-language assistant bridge.
//!
//! Translates prompts into shell command suggestions via an external
//! text-generation provider, tags risky suggestions through the
//! dangerous-command classifier, and records every exchange for auditing.

mod provider;
pub mod safety;

pub use provider::Provider;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::GatewayDatabase;

/// Confidence ceiling applied to free-text fallbacks and to any reply
/// containing a dangerous command.
const REDUCED_CONFIDENCE: f64 = 0.6;

/// Assistant failures. These degrade to an empty reply at the session
/// boundary; they never tear down the stream.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("No assistant provider is configured")]
    NotConfigured,

    #[error("Provider request failed: {0}")]
    Transport(String),

    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Provider response was malformed")]
    MalformedResponse,
}

/// A structured assistant reply.
#[derive(Debug, Clone)]
pub struct AssistantReply {
    pub commands: Vec<String>,
    pub explanation: String,
    pub warnings: Vec<String>,
    /// In [0, 1].
    pub confidence: f64,
}

/// Shape the provider is instructed to answer with.
#[derive(Debug, Deserialize)]
struct StructuredAnswer {
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    confidence: Option<f64>,
}

const TRANSLATE_SYSTEM: &str = "You translate natural-language requests into POSIX shell \
commands. Answer with a single JSON object of the shape \
{\"commands\": [\"...\"], \"explanation\": \"...\", \"confidence\": 0.0} and nothing else. \
Prefer portable commands and never invent host-specific paths.";

const EXPLAIN_SYSTEM: &str = "You explain shell commands to an operator. Answer with a single \
JSON object of the shape {\"commands\": [], \"explanation\": \"...\", \"confidence\": 0.0} \
and nothing else.";

const QUERY_SYSTEM: &str = "You are a server administration assistant. Answer with a single \
JSON object of the shape {\"commands\": [\"...\"], \"explanation\": \"...\", \
\"confidence\": 0.0} and nothing else; leave commands empty when none apply.";

/// Bridge between the session broker and the configured provider.
pub struct AssistantBridge {
    provider: Provider,
    db: GatewayDatabase,
}

impl AssistantBridge {
    pub fn new(provider: Provider, db: GatewayDatabase) -> Self {
        Self { provider, db }
    }

    /// Translate a natural-language prompt into command suggestions.
    pub async fn translate(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        prompt: &str,
        context: Option<&str>,
    ) -> Result<AssistantReply, AssistantError> {
        let full_prompt = match context {
            Some(context) => format!("Context:\n{context}\n\nRequest: {prompt}"),
            None => prompt.to_string(),
        };
        self.run(user_id, session_id, TRANSLATE_SYSTEM, &full_prompt, prompt)
            .await
    }

    /// Explain what a command does and what could go wrong.
    pub async fn explain(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        command: &str,
    ) -> Result<AssistantReply, AssistantError> {
        let prompt = format!("Explain this command: {command}");
        let mut reply = self
            .run(user_id, session_id, EXPLAIN_SYSTEM, &prompt, &prompt)
            .await?;
        // the explained command itself is classified, not only suggestions
        if safety::is_dangerous(command) {
            reply
                .warnings
                .push(format!("'{command}' is a high-risk command"));
            reply.confidence = reply.confidence.min(REDUCED_CONFIDENCE);
        }
        Ok(reply)
    }

    /// Free-form operator question; commands are optional in the answer.
    pub async fn query(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        prompt: &str,
    ) -> Result<AssistantReply, AssistantError> {
        self.run(user_id, session_id, QUERY_SYSTEM, prompt, prompt)
            .await
    }

    async fn run(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        system: &str,
        full_prompt: &str,
        audit_prompt: &str,
    ) -> Result<AssistantReply, AssistantError> {
        let raw = self.provider.complete(system, full_prompt).await?;
        let mut reply = parse_reply(&raw);
        apply_safety(&mut reply);

        self.persist(user_id, session_id, audit_prompt, &raw, &reply)
            .await;
        Ok(reply)
    }

    /// Best-effort audit write; a failed insert degrades to a log line
    /// rather than failing the user-visible reply.
    async fn persist(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        prompt: &str,
        raw: &str,
        reply: &AssistantReply,
    ) {
        let commands_json =
            serde_json::to_string(&reply.commands).unwrap_or_else(|_| "[]".to_string());
        let warnings_json =
            serde_json::to_string(&reply.warnings).unwrap_or_else(|_| "[]".to_string());

        let result = self
            .db
            .insert_ai_query(
                &Uuid::new_v4().to_string(),
                user_id,
                session_id,
                prompt,
                raw,
                &commands_json,
                &reply.explanation,
                &warnings_json,
                reply.confidence,
            )
            .await;
        if let Err(err) = result {
            warn!(error = %err, "Failed to record assistant query");
        }
    }
}

/// Parse the provider's answer: structured JSON when it obeyed the
/// instructions, fenced-code-block extraction at reduced confidence when
/// it did not.
fn parse_reply(raw: &str) -> AssistantReply {
    if let Some(answer) = parse_structured(raw) {
        let confidence = answer.confidence.unwrap_or(0.8).clamp(0.0, 1.0);
        return AssistantReply {
            commands: answer.commands,
            explanation: answer.explanation,
            warnings: Vec::new(),
            confidence,
        };
    }

    debug!("Provider answer was not structured, extracting code blocks");
    let commands = extract_fenced_commands(raw);
    AssistantReply {
        commands,
        explanation: strip_fences(raw),
        warnings: Vec::new(),
        confidence: REDUCED_CONFIDENCE,
    }
}

fn parse_structured(raw: &str) -> Option<StructuredAnswer> {
    let trimmed = raw.trim();
    if let Ok(answer) = serde_json::from_str::<StructuredAnswer>(trimmed) {
        return Some(answer);
    }
    // models frequently wrap the object in a ```json fence
    let block = fenced_blocks(trimmed)
        .into_iter()
        .find(|block| block.trim_start().starts_with('{'))?;
    serde_json::from_str::<StructuredAnswer>(block.trim()).ok()
}

/// Non-empty lines of every fenced code block, with comments dropped.
fn extract_fenced_commands(raw: &str) -> Vec<String> {
    fenced_blocks(raw)
        .into_iter()
        .flat_map(|block| {
            block
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

fn fenced_blocks(raw: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = raw;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // skip the info string (e.g. ```bash)
        let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
        let body = &after_fence[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => break,
        }
    }
    blocks
}

fn strip_fences(raw: &str) -> String {
    let mut out = String::new();
    let mut in_fence = false;
    for line in raw.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            out.push_str(line);
            out.push('\n');
        }
    }
    out.trim().to_string()
}

fn apply_safety(reply: &mut AssistantReply) {
    for command in &reply.commands {
        if safety::is_dangerous(command) {
            reply
                .warnings
                .push(format!("'{command}' is a high-risk command"));
            reply.confidence = reply.confidence.min(REDUCED_CONFIDENCE);
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn structured_answer_is_parsed_directly() {
        let raw = r#"{"commands": ["ls -la"], "explanation": "lists files", "confidence": 0.95}"#;
        let reply = parse_reply(raw);
        assert_eq!(reply.commands, vec!["ls -la"]);
        assert_eq!(reply.explanation, "lists files");
        assert!((reply.confidence - 0.95).abs() < f64::EPSILON);
        assert!(reply.warnings.is_empty());
    }

    #[test]
    fn structured_answer_inside_fence_is_parsed() {
        let raw = "Here you go:\n```json\n{\"commands\": [\"df -h\"], \"explanation\": \"disk usage\", \"confidence\": 0.9}\n```";
        let reply = parse_reply(raw);
        assert_eq!(reply.commands, vec!["df -h"]);
    }

    #[test]
    fn free_text_falls_back_to_code_blocks_at_reduced_confidence() {
        let raw = "Run this:\n```bash\nuptime\n# then check\nfree -m\n```\nDone.";
        let reply = parse_reply(raw);
        assert_eq!(reply.commands, vec!["uptime", "free -m"]);
        assert!(reply.confidence <= REDUCED_CONFIDENCE);
        assert!(reply.explanation.contains("Run this:"));
        assert!(!reply.explanation.contains("```"));
    }

    #[test]
    fn confidence_is_clamped_into_unit_range() {
        let raw = r#"{"commands": [], "explanation": "x", "confidence": 7.5}"#;
        let reply = parse_reply(raw);
        assert!((reply.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn dangerous_commands_are_tagged_and_capped() {
        let raw = r#"{"commands": ["reboot"], "explanation": "restarts", "confidence": 0.99}"#;
        let mut reply = parse_reply(raw);
        apply_safety(&mut reply);
        assert_eq!(reply.warnings.len(), 1);
        assert!(reply.warnings[0].contains("reboot"));
        assert!(reply.confidence <= REDUCED_CONFIDENCE);
    }

    #[test]
    fn unfenced_answer_yields_no_commands() {
        let reply = parse_reply("Just restart the service when convenient.");
        assert!(reply.commands.is_empty());
        assert!(reply.confidence <= REDUCED_CONFIDENCE);
    }

    #[test]
    fn multiple_fences_are_all_extracted() {
        let raw = "```\nls\n```\ntext\n```\npwd\n```";
        assert_eq!(extract_fenced_commands(raw), vec!["ls", "pwd"]);
    }
}
