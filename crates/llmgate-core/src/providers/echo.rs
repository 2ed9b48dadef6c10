//! Echo provider for development and tests

use std::time::Duration;

use futures::stream;

use super::{ChunkStream, Provider, RequestContext};
use crate::error::ProviderError;
use crate::models::{CompletionChunk, CompletionRequest, CompletionResponse, Usage};

/// Answers every request with its own prompt.
///
/// Token usage is approximated as one token per four bytes.
#[derive(Debug, Clone)]
pub struct EchoProvider {
    id: String,
    default_model: String,
    latency: Duration,
}

impl EchoProvider {
    /// Create an echo provider with the given identity
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            default_model: "echo-1".to_string(),
            latency: Duration::ZERO,
        }
    }

    /// Model reported when the request names none
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Simulated round-trip time
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn respond(&self, request: &CompletionRequest) -> CompletionResponse {
        let combined = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let content = format!("[{}] {}", self.id, combined);

        CompletionResponse {
            usage: Usage::new(combined.len() as u64 / 4, content.len() as u64 / 4),
            content,
            model: request
                .requested_model()
                .unwrap_or(&self.default_model)
                .to_string(),
            provider: self.id.clone(),
        }
    }

    async fn simulate_latency(&self, ctx: &RequestContext) -> Result<(), ProviderError> {
        if self.latency.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = tokio::time::sleep(self.latency) => Ok(()),
            () = ctx.cancellation().cancelled() => {
                Err(ProviderError::Transport("request cancelled".to_string()))
            }
        }
    }
}

#[async_trait::async_trait]
impl Provider for EchoProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        ctx: &RequestContext,
    ) -> Result<CompletionResponse, ProviderError> {
        self.simulate_latency(ctx).await?;
        Ok(self.respond(request))
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        ctx: &RequestContext,
    ) -> Result<ChunkStream, ProviderError> {
        self.simulate_latency(ctx).await?;
        let response = self.respond(request);

        let mut chunks: Vec<_> = response
            .content
            .split_inclusive(' ')
            .map(|word| {
                Ok(CompletionChunk {
                    content: word.to_string(),
                    model: Some(response.model.clone()),
                    provider: Some(self.id.clone()),
                    ..CompletionChunk::default()
                })
            })
            .collect();
        chunks.push(Ok(CompletionChunk {
            model: Some(response.model.clone()),
            provider: Some(self.id.clone()),
            ..CompletionChunk::done(Some(response.usage))
        }));

        Ok(Box::pin(stream::iter(chunks)))
    }
}
