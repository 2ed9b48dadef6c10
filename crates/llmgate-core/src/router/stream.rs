//! Accounting wrapper around provider streams

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::models::{CompletionChunk, Usage};
use crate::providers::ChunkStream;

/// How a stream finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    /// Terminal chunk seen
    Completed {
        /// Usage carried by the terminal chunk
        usage: Option<Usage>,
        /// Model the provider reported, from the terminal chunk or the last one naming it
        model: Option<String>,
    },
    /// The provider reported an error
    Failed,
}

type Finalizer = Box<dyn FnOnce(StreamEnd) + Send>;

/// Passes chunks through and runs a finalizer exactly once when the stream reaches its
/// terminal chunk or an error.
///
/// Dropping the stream early, or cancelling its token, skips the finalizer.
pub(crate) struct MeteredStream {
    inner: ChunkStream,
    provider: String,
    model: String,
    cancel: CancellationToken,
    finalize: Option<Finalizer>,
    reported_model: Option<String>,
    finished: bool,
}

impl MeteredStream {
    pub(crate) fn new(
        inner: ChunkStream,
        provider: String,
        model: String,
        cancel: CancellationToken,
        finalize: impl FnOnce(StreamEnd) + Send + 'static,
    ) -> Self {
        Self {
            inner,
            provider,
            model,
            cancel,
            finalize: Some(Box::new(finalize)),
            reported_model: None,
            finished: false,
        }
    }

    fn finish(&mut self, end: StreamEnd) {
        self.finished = true;
        if let Some(finalize) = self.finalize.take() {
            finalize(end);
        }
    }

    fn label(&self, mut chunk: CompletionChunk) -> CompletionChunk {
        if chunk.provider.is_none() {
            chunk.provider = Some(self.provider.clone());
        }
        if chunk.model.is_none() && !self.model.is_empty() {
            chunk.model = Some(self.model.clone());
        }
        chunk
    }
}

impl Stream for MeteredStream {
    type Item = Result<CompletionChunk, ProviderError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if this.cancel.is_cancelled() {
            this.finished = true;
            this.finalize = None;
            return Poll::Ready(None);
        }

        match ready!(this.inner.poll_next_unpin(cx)) {
            Some(Ok(chunk)) => {
                if let Some(model) = chunk.model.as_ref().filter(|m| !m.is_empty()) {
                    this.reported_model = Some(model.clone());
                }
                let chunk = this.label(chunk);
                if chunk.done {
                    let end = if chunk.error.is_some() {
                        StreamEnd::Failed
                    } else {
                        StreamEnd::Completed {
                            usage: chunk.usage,
                            model: this.reported_model.take(),
                        }
                    };
                    this.finish(end);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(err)) => {
                this.finish(StreamEnd::Failed);
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.finish(StreamEnd::Failed);
                Poll::Ready(Some(Err(ProviderError::Stream(
                    "stream ended without a terminal chunk".to_string(),
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn metered(
        chunks: Vec<Result<CompletionChunk, ProviderError>>,
    ) -> (MeteredStream, Arc<Mutex<Vec<StreamEnd>>>) {
        metered_with(chunks, "gpt-4o", CancellationToken::new())
    }

    fn metered_with(
        chunks: Vec<Result<CompletionChunk, ProviderError>>,
        model: &str,
        cancel: CancellationToken,
    ) -> (MeteredStream, Arc<Mutex<Vec<StreamEnd>>>) {
        let ends = Arc::new(Mutex::new(Vec::new()));
        let sink = ends.clone();
        let stream = MeteredStream::new(
            Box::pin(stream::iter(chunks)),
            "openai".to_string(),
            model.to_string(),
            cancel,
            move |end| sink.lock().push(end),
        );
        (stream, ends)
    }

    fn named(chunk: CompletionChunk, model: &str) -> CompletionChunk {
        CompletionChunk {
            model: Some(model.to_string()),
            ..chunk
        }
    }

    #[tokio::test]
    async fn test_finalizes_on_terminal_chunk() {
        let usage = Usage::new(3, 4);
        let (stream, ends) = metered(vec![
            Ok(CompletionChunk::delta("hi")),
            Ok(CompletionChunk::done(Some(usage))),
            Ok(CompletionChunk::delta("ignored")),
        ]);

        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].as_ref().unwrap().provider.as_deref(),
            Some("openai")
        );
        assert_eq!(
            *ends.lock(),
            vec![StreamEnd::Completed {
                usage: Some(usage),
                model: None,
            }]
        );
    }

    #[tokio::test]
    async fn test_reports_provider_model_when_none_resolved() {
        let usage = Usage::new(3, 4);
        let (stream, ends) = metered_with(
            vec![
                Ok(named(CompletionChunk::delta("hi"), "echo-1")),
                Ok(CompletionChunk::done(Some(usage))),
            ],
            "",
            CancellationToken::new(),
        );

        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks[1].as_ref().unwrap().model, None);
        assert_eq!(
            *ends.lock(),
            vec![StreamEnd::Completed {
                usage: Some(usage),
                model: Some("echo-1".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn test_terminal_chunk_model_wins() {
        let (stream, ends) = metered_with(
            vec![
                Ok(named(CompletionChunk::delta("hi"), "echo-1")),
                Ok(named(CompletionChunk::done(None), "echo-2")),
            ],
            "",
            CancellationToken::new(),
        );

        let _: Vec<_> = stream.collect().await;
        assert_eq!(
            *ends.lock(),
            vec![StreamEnd::Completed {
                usage: None,
                model: Some("echo-2".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn test_cancelled_token_ends_stream_without_finalizing() {
        let cancel = CancellationToken::new();
        let (mut stream, ends) = metered_with(
            vec![
                Ok(CompletionChunk::delta("hi")),
                Ok(CompletionChunk::delta("there")),
                Ok(CompletionChunk::done(Some(Usage::new(1, 1)))),
            ],
            "gpt-4o",
            cancel.clone(),
        );

        assert!(stream.next().await.is_some());
        cancel.cancel();

        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
        assert!(ends.lock().is_empty());
    }

    #[tokio::test]
    async fn test_error_finalizes_as_failure() {
        let (stream, ends) = metered(vec![
            Ok(CompletionChunk::delta("hi")),
            Err(ProviderError::Stream("reset".to_string())),
        ]);

        let chunks: Vec<_> = stream.collect().await;
        assert!(chunks[1].is_err());
        assert_eq!(*ends.lock(), vec![StreamEnd::Failed]);
    }

    #[tokio::test]
    async fn test_missing_terminal_chunk_is_an_error() {
        let (stream, ends) = metered(vec![Ok(CompletionChunk::delta("hi"))]);

        let chunks: Vec<_> = stream.collect().await;
        assert!(matches!(chunks.last(), Some(Err(ProviderError::Stream(_)))));
        assert_eq!(*ends.lock(), vec![StreamEnd::Failed]);
    }

    #[tokio::test]
    async fn test_drop_before_terminal_records_nothing() {
        let (mut stream, ends) = metered(vec![
            Ok(CompletionChunk::delta("hi")),
            Ok(CompletionChunk::done(None)),
        ]);

        let first = stream.next().await;
        assert!(first.is_some());
        drop(stream);

        assert!(ends.lock().is_empty());
    }
}
