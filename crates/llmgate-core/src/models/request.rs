//! Completion request and response models

use serde::{Deserialize, Serialize};

/// A single chat turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// system | user | assistant
    pub role: String,
    /// Message text
    pub content: String,
}

impl Message {
    /// Create a message with an arbitrary role
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Sampling parameters; unset values fall back to the agent's configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Maximum completion tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Nucleus sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

/// An LLM completion request as issued by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Calling agent
    pub agent_id: String,

    /// Requested model; empty or absent means "use the agent default"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Ordered message turns
    pub messages: Vec<Message>,

    /// Sampling parameters
    #[serde(flatten)]
    pub sampling: SamplingParams,

    /// Whether the caller wants a streamed response
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    /// Create a request for an agent with the given messages
    pub fn new(agent_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            agent_id: agent_id.into(),
            model: None,
            messages,
            sampling: SamplingParams::default(),
            stream: false,
        }
    }

    /// Set an explicit model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.sampling.temperature = Some(temperature);
        self
    }

    /// Set the completion token limit
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.sampling.max_tokens = Some(max_tokens);
        self
    }

    /// The explicitly requested model, treating an empty string as absent
    pub fn requested_model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// Check the fields every request must carry
    pub fn validate(&self) -> crate::Result<()> {
        if self.agent_id.trim().is_empty() {
            return Err(crate::Error::validation("agent_id is required"));
        }
        if self.messages.is_empty() {
            return Err(crate::Error::validation("messages are required"));
        }
        Ok(())
    }
}

/// Token usage reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt (input) tokens
    pub prompt_tokens: u64,
    /// Completion (output) tokens
    pub completion_tokens: u64,
    /// Sum of prompt and completion tokens
    pub total_tokens: u64,
}

impl Usage {
    /// Create usage from prompt and completion counts
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A complete (non-streamed) response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text
    pub content: String,
    /// Model that produced the response
    pub model: String,
    /// Provider that produced the response
    pub provider: String,
    /// Token usage
    pub usage: Usage,
}

/// A partial response emitted while streaming
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
    /// Incremental text
    #[serde(default)]
    pub content: String,

    /// Model producing the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Provider producing the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Terminal marker
    pub done: bool,

    /// Usage, normally only present on the terminal chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Error description for a failed stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionChunk {
    /// A content delta
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// The terminal chunk
    pub fn done(usage: Option<Usage>) -> Self {
        Self {
            done: true,
            usage,
            ..Self::default()
        }
    }

    /// A terminal chunk describing a failure
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            done: true,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_model_is_absent() {
        let req = CompletionRequest::new("ada", vec![Message::user("hi")]).with_model("  ");
        assert_eq!(req.requested_model(), None);

        let req = req.with_model("gpt-4o");
        assert_eq!(req.requested_model(), Some("gpt-4o"));
    }

    #[test]
    fn test_request_deserializes_flat_sampling_params() {
        let req: CompletionRequest = serde_json::from_str(
            r#"{
                "agent_id": "ada",
                "messages": [{"role": "user", "content": "hi"}],
                "temperature": 0.2,
                "max_tokens": 64
            }"#,
        )
        .unwrap();

        assert_eq!(req.model, None);
        assert_eq!(req.sampling.temperature, Some(0.2));
        assert_eq!(req.sampling.max_tokens, Some(64));
        assert!(!req.stream);
    }

    #[test]
    fn test_validate() {
        assert!(CompletionRequest::new("", vec![Message::user("hi")]).validate().is_err());
        assert!(CompletionRequest::new("ada", vec![]).validate().is_err());
        assert!(CompletionRequest::new("ada", vec![Message::user("hi")]).validate().is_ok());
    }
}
