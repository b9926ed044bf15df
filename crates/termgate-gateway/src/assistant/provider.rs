//! Text-generation providers behind the assistant bridge.
//!
//! Thin reqwest clients for an OpenAI-compatible chat endpoint and the
//! Anthropic messages endpoint. The bridge owns prompting and parsing;
//! providers only move text.

use std::time::Duration;

use serde_json::json;
use termgate_core::config::AssistantConfig;
use tracing::debug;

use super::AssistantError;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODEL: &str = "gpt-4o-mini";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderKind {
    OpenAi,
    Anthropic,
}

/// A configured text-generation provider.
pub struct Provider {
    kind: ProviderKind,
    api_key: String,
    http: reqwest::Client,
}

impl Provider {
    /// Pick the provider from configuration. The default is deterministic:
    /// Anthropic when its key is present, otherwise OpenAI; `None` when
    /// neither credential is configured.
    pub fn from_config(config: &AssistantConfig) -> Option<Self> {
        let (kind, api_key) = if let Some(key) = &config.anthropic_api_key {
            (ProviderKind::Anthropic, key.clone())
        } else if let Some(key) = &config.openai_api_key {
            (ProviderKind::OpenAi, key.clone())
        } else {
            return None;
        };

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .ok()?;

        Some(Self {
            kind,
            api_key,
            http,
        })
    }

    /// Provider name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self.kind {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    /// Run one completion and return the model's text.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String, AssistantError> {
        match self.kind {
            ProviderKind::OpenAi => self.complete_openai(system, prompt).await,
            ProviderKind::Anthropic => self.complete_anthropic(system, prompt).await,
        }
    }

    async fn complete_openai(&self, system: &str, prompt: &str) -> Result<String, AssistantError> {
        let body = json!({
            "model": OPENAI_MODEL,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "temperature": 0.2,
            "max_tokens": MAX_TOKENS,
        });

        let response = self
            .http
            .post(OPENAI_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::Provider {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("request failed").into(),
            });
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Transport(e.to_string()))?;
        debug!(provider = self.name(), "Completion received");

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or(AssistantError::MalformedResponse)
    }

    async fn complete_anthropic(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, AssistantError> {
        let body = json!({
            "model": ANTHROPIC_MODEL,
            "max_tokens": MAX_TOKENS,
            "system": system,
            "messages": [
                {"role": "user", "content": prompt},
            ],
        });

        let response = self
            .http
            .post(ANTHROPIC_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::Provider {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("request failed").into(),
            });
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Transport(e.to_string()))?;
        debug!(provider = self.name(), "Completion received");

        payload["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or(AssistantError::MalformedResponse)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_key_wins_when_both_are_set() {
        let provider = Provider::from_config(&AssistantConfig {
            openai_api_key: Some("sk-a".into()),
            anthropic_api_key: Some("sk-b".into()),
        })
        .unwrap();
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn openai_is_used_when_only_its_key_is_set() {
        let provider = Provider::from_config(&AssistantConfig {
            openai_api_key: Some("sk-a".into()),
            anthropic_api_key: None,
        })
        .unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn no_keys_means_no_provider() {
        assert!(Provider::from_config(&AssistantConfig::default()).is_none());
    }
}
