//! Circuit breaker around a provider
//!
//! After `failure_threshold` consecutive failures the circuit opens and calls fail fast
//! with [`ProviderError::CircuitOpen`] without reaching the provider. Once
//! `reset_timeout` has passed since the last failure the next call is let through
//! (half-open); `success_threshold` successes in a row close the circuit again, and any
//! failure while half-open reopens it.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use super::{ChunkStream, Provider, RequestContext};
use crate::config::CircuitBreakerConfig;
use crate::error::ProviderError;
use crate::models::{CompletionRequest, CompletionResponse};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow through
    #[default]
    Closed,
    /// Calls fail fast
    Open,
    /// Trial calls decide whether to close or reopen
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures counted toward opening
    pub failures: u32,
    /// Calls rejected while open
    pub rejected: u64,
}

#[derive(Debug)]
struct Breaker {
    provider: String,
    config: CircuitBreakerConfig,
    state: CircuitState,
    failures: u32,
    successes: u32,
    rejected: u64,
    last_failure: Option<Instant>,
}

impl Breaker {
    fn new(provider: String, config: CircuitBreakerConfig) -> Self {
        Self {
            provider,
            config,
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            rejected: 0,
            last_failure: None,
        }
    }

    fn admit(&mut self, now: Instant) -> Result<(), ProviderError> {
        if self.state != CircuitState::Open {
            return Ok(());
        }

        let cooled = self
            .last_failure
            .map_or(true, |at| now.saturating_duration_since(at) >= self.config.reset_timeout);
        if cooled {
            self.state = CircuitState::HalfOpen;
            self.successes = 0;
            info!(provider = %self.provider, "Circuit half-open, letting a trial call through");
            return Ok(());
        }

        self.rejected += 1;
        Err(ProviderError::CircuitOpen)
    }

    fn on_success(&mut self) {
        match self.state {
            CircuitState::Closed => self.failures = 0,
            CircuitState::HalfOpen => {
                self.successes += 1;
                if self.successes >= self.config.success_threshold {
                    self.state = CircuitState::Closed;
                    self.failures = 0;
                    self.successes = 0;
                    info!(provider = %self.provider, "Circuit closed");
                }
            }
            // A call admitted before the circuit opened
            CircuitState::Open => {}
        }
    }

    fn on_failure(&mut self, now: Instant) {
        self.last_failure = Some(now);
        self.failures = self.failures.saturating_add(1);

        let trips = match self.state {
            CircuitState::Closed => self.failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if trips {
            self.state = CircuitState::Open;
            self.successes = 0;
            warn!(
                provider = %self.provider,
                failures = self.failures,
                reset_timeout = %humantime::format_duration(self.config.reset_timeout),
                "Circuit opened"
            );
        }
    }

    fn record(&mut self, error: Option<&ProviderError>, now: Instant) {
        match error {
            None => self.on_success(),
            Some(err) if counts_as_failure(err) => self.on_failure(now),
            Some(_) => {}
        }
    }
}

/// Errors caused by the caller say nothing about provider health
fn counts_as_failure(err: &ProviderError) -> bool {
    !matches!(err, ProviderError::InvalidRequest(_) | ProviderError::CircuitOpen)
}

/// A [`Provider`] that stops calling its inner provider while it keeps failing
pub struct CircuitBreaker {
    inner: Arc<dyn Provider>,
    breaker: Arc<Mutex<Breaker>>,
}

impl CircuitBreaker {
    /// Wrap `inner`
    pub fn new(inner: Arc<dyn Provider>, config: CircuitBreakerConfig) -> Self {
        let breaker = Breaker::new(inner.id().to_string(), config);
        Self {
            inner,
            breaker: Arc::new(Mutex::new(breaker)),
        }
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.breaker.lock().state
    }

    /// State, failure count and rejections
    pub fn snapshot(&self) -> CircuitSnapshot {
        let breaker = self.breaker.lock();
        CircuitSnapshot {
            state: breaker.state,
            failures: breaker.failures,
            rejected: breaker.rejected,
        }
    }

    /// Close the circuit and forget past failures
    pub fn reset(&self) {
        let mut breaker = self.breaker.lock();
        breaker.state = CircuitState::Closed;
        breaker.failures = 0;
        breaker.successes = 0;
        breaker.last_failure = None;
        info!(provider = %breaker.provider, "Circuit reset");
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("provider", &self.inner.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Provider for CircuitBreaker {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        ctx: &RequestContext,
    ) -> Result<CompletionResponse, ProviderError> {
        self.breaker.lock().admit(Instant::now())?;

        let result = self.inner.complete(request, ctx).await;
        self.breaker
            .lock()
            .record(result.as_ref().err(), Instant::now());
        result
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        ctx: &RequestContext,
    ) -> Result<ChunkStream, ProviderError> {
        self.breaker.lock().admit(Instant::now())?;

        let inner = match self.inner.stream(request, ctx).await {
            Ok(inner) => inner,
            Err(err) => {
                self.breaker.lock().record(Some(&err), Instant::now());
                return Err(err);
            }
        };

        // The outcome is known at the terminal chunk or the first error
        let breaker = Arc::clone(&self.breaker);
        let mut settled = false;
        let observed = inner.inspect(move |item| {
            if settled {
                return;
            }
            match item {
                Ok(chunk) if chunk.done => {
                    settled = true;
                    let mut breaker = breaker.lock();
                    match &chunk.error {
                        Some(message) => breaker.record(
                            Some(&ProviderError::Stream(message.clone())),
                            Instant::now(),
                        ),
                        None => breaker.record(None, Instant::now()),
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    settled = true;
                    breaker.lock().record(Some(err), Instant::now());
                }
            }
        });
        Ok(Box::pin(observed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::models::{CompletionChunk, Message, Usage};

    /// Fails while `failing` is set and counts the calls that reach it
    struct Flaky {
        failing: AtomicBool,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                failing: AtomicBool::new(true),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Provider for Flaky {
        fn id(&self) -> &str {
            "openai"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
            _ctx: &RequestContext,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(ProviderError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(CompletionResponse {
                content: "ok".to_string(),
                model: request.model.clone().unwrap_or_default(),
                provider: "openai".to_string(),
                usage: Usage::new(1, 1),
            })
        }

        async fn stream(
            &self,
            _request: &CompletionRequest,
            _ctx: &RequestContext,
        ) -> Result<ChunkStream, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let last = if self.failing.load(Ordering::SeqCst) {
                Err(ProviderError::Stream("reset".to_string()))
            } else {
                Ok(CompletionChunk::done(None))
            };
            Ok(Box::pin(futures::stream::iter(vec![
                Ok(CompletionChunk::delta("hi")),
                last,
            ])))
        }
    }

    fn config(reset_timeout: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 3,
            reset_timeout,
            success_threshold: 2,
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("ada", vec![Message::user("hi")])
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_fails_fast() {
        let flaky = Flaky::new();
        let breaker = CircuitBreaker::new(flaky.clone(), config(Duration::from_secs(60)));
        let ctx = RequestContext::new();

        for _ in 0..3 {
            assert!(breaker.complete(&request(), &ctx).await.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = breaker.complete(&request(), &ctx).await.unwrap_err();
        assert_eq!(err, ProviderError::CircuitOpen);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert_eq!(breaker.snapshot().rejected, 1);
    }

    #[tokio::test]
    async fn test_half_open_closes_after_successes() {
        let flaky = Flaky::new();
        let breaker = CircuitBreaker::new(flaky.clone(), config(Duration::from_millis(20)));
        let ctx = RequestContext::new();

        for _ in 0..3 {
            let _ = breaker.complete(&request(), &ctx).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        flaky.failing.store(false, Ordering::SeqCst);

        assert!(breaker.complete(&request(), &ctx).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.complete(&request(), &ctx).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().failures, 0);
    }

    #[test]
    fn test_failure_while_half_open_reopens() {
        let mut breaker = Breaker::new("openai".to_string(), config(Duration::from_secs(10)));
        let now = Instant::now();
        let unavailable = ProviderError::Transport("refused".to_string());

        for _ in 0..3 {
            breaker.record(Some(&unavailable), now);
        }
        assert_eq!(breaker.state, CircuitState::Open);
        assert!(breaker.admit(now + Duration::from_secs(5)).is_err());

        let later = now + Duration::from_secs(10);
        assert!(breaker.admit(later).is_ok());
        assert_eq!(breaker.state, CircuitState::HalfOpen);

        breaker.record(Some(&unavailable), later);
        assert_eq!(breaker.state, CircuitState::Open);
        assert!(breaker.admit(later + Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let mut breaker = Breaker::new("openai".to_string(), config(Duration::from_secs(10)));
        let now = Instant::now();
        let unavailable = ProviderError::Transport("refused".to_string());

        breaker.record(Some(&unavailable), now);
        breaker.record(Some(&unavailable), now);
        breaker.record(None, now);
        breaker.record(Some(&unavailable), now);

        assert_eq!(breaker.state, CircuitState::Closed);
        assert_eq!(breaker.failures, 1);
    }

    #[test]
    fn test_invalid_requests_do_not_count() {
        let mut breaker = Breaker::new("openai".to_string(), config(Duration::from_secs(10)));
        let now = Instant::now();

        for _ in 0..5 {
            breaker.record(Some(&ProviderError::InvalidRequest("bad".to_string())), now);
        }
        assert_eq!(breaker.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_stream_errors_trip_the_circuit() {
        let flaky = Flaky::new();
        let breaker = CircuitBreaker::new(flaky.clone(), config(Duration::from_secs(60)));
        let ctx = RequestContext::new();

        for _ in 0..3 {
            let chunks: Vec<_> = breaker.stream(&request(), &ctx).await.unwrap().collect().await;
            assert!(chunks.last().unwrap().is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(
            breaker.stream(&request(), &ctx).await,
            Err(ProviderError::CircuitOpen)
        ));

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.stream(&request(), &ctx).await.is_ok());
    }
}
