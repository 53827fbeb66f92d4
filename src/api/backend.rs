//! Answer backend trait.
//!
//! The turn orchestrator talks to the network only through
//! [`AnswerBackend`], so tests and alternative transports can substitute
//! scripted event streams.

use async_trait::async_trait;

use super::types::{FallbackReply, TurnRequest};
use crate::error::TutorError;
use crate::stream::TurnEventStream;

/// Trait for answer-generation backends.
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    /// Open a streamed turn.
    ///
    /// Non-success responses map to errors before any event is yielded:
    /// `Auth` (401/403), `RateLimited` (429), `Unavailable` (503),
    /// `Validation` (400/422) or `Request`.
    async fn open_stream(&self, request: &TurnRequest) -> Result<TurnEventStream, TutorError>;

    /// Perform a turn through the non-streaming endpoint.
    async fn complete(&self, request: &TurnRequest) -> Result<FallbackReply, TutorError>;
}

#[async_trait]
impl<B: AnswerBackend + ?Sized> AnswerBackend for std::sync::Arc<B> {
    async fn open_stream(&self, request: &TurnRequest) -> Result<TurnEventStream, TutorError> {
        (**self).open_stream(request).await
    }

    async fn complete(&self, request: &TurnRequest) -> Result<FallbackReply, TutorError> {
        (**self).complete(request).await
    }
}
