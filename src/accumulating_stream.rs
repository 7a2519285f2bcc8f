//! Accumulates answer events into a complete reply while passing events through.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::oneshot;

use crate::client::EventStream;
use crate::types::{AssistantReply, ReplyOutcome, StreamEvent};

/// Detail recorded when the events stop before `done` or `error`.
pub const ENDED_EARLY: &str = "stream ended without a terminal event";

/// A stream wrapper that folds [`StreamEvent`]s into an [`AssistantReply`].
///
/// Events can be shown to the user as they arrive while the reply is built
/// alongside.  When the stream is drained, the reply is sent on the oneshot
/// returned by `new()`.  Dropping the stream before that drops the sender.
pub struct AccumulatingStream {
    inner: EventStream,
    reply_tx: Option<oneshot::Sender<AssistantReply>>,
    reply: AssistantReply,
}

impl AccumulatingStream {
    /// Wraps `stream`.  Returns the wrapper and a receiver for the finished reply.
    pub fn new<S>(stream: S) -> (Self, oneshot::Receiver<AssistantReply>)
    where
        S: Stream<Item = StreamEvent> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let this = Self {
            inner: Box::pin(stream),
            reply_tx: Some(tx),
            reply: AssistantReply::new(),
        };
        (this, rx)
    }

    /// The reply as accumulated so far.
    pub fn reply(&self) -> &AssistantReply {
        &self.reply
    }

    fn finalize(&mut self) -> AssistantReply {
        let mut reply = std::mem::take(&mut self.reply);
        if !reply.is_finished() {
            reply.outcome = ReplyOutcome::Failed {
                detail: ENDED_EARLY.to_string(),
            };
        }
        reply
    }

    /// Finalizes the reply without draining the stream.
    ///
    /// A reply that has not seen a terminal event is marked failed, so it
    /// never reads as still streaming.
    pub fn finalize_partial(&mut self) -> AssistantReply {
        self.reply_tx.take();
        self.finalize()
    }
}

impl Stream for AccumulatingStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(event)) => {
                self.reply.apply(&event);
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                if let Some(tx) = self.reply_tx.take() {
                    let reply = self.finalize();
                    let _ = tx.send(reply);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
