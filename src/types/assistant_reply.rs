use serde::{Deserialize, Serialize};

use crate::types::{ChatResponse, ListingReference, StreamEvent};

/// Where an [`AssistantReply`] stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ReplyOutcome {
    /// Events are still arriving.
    Streaming,
    /// A `done` event arrived.
    Complete,
    /// An `error` event arrived.
    Failed {
        /// The error detail.
        detail: String,
    },
}

/// An assistant answer assembled from stream events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantReply {
    /// Concatenated chunk text.
    pub text: String,
    /// Step labels in arrival order.
    pub steps: Vec<String>,
    /// References from the `done` event.
    pub references: Vec<ListingReference>,
    /// Current outcome.
    pub outcome: ReplyOutcome,
}

impl AssistantReply {
    /// An empty reply waiting for events.
    pub fn new() -> Self {
        Self {
            text: String::new(),
            steps: Vec::new(),
            references: Vec::new(),
            outcome: ReplyOutcome::Streaming,
        }
    }

    /// Fold one event into the reply.  Events after a terminal event are ignored.
    pub fn apply(&mut self, event: &StreamEvent) {
        if self.is_finished() {
            return;
        }
        match event {
            StreamEvent::Step { message } => self.steps.push(message.clone()),
            StreamEvent::Chunk { content } => self.text.push_str(content),
            StreamEvent::Done { references } => {
                self.references = references.clone();
                self.outcome = ReplyOutcome::Complete;
            }
            StreamEvent::Error { detail } => {
                self.outcome = ReplyOutcome::Failed {
                    detail: detail.clone(),
                };
            }
        }
    }

    /// True once a terminal event has been applied.
    pub fn is_finished(&self) -> bool {
        !matches!(self.outcome, ReplyOutcome::Streaming)
    }

    /// The text a user should see.
    ///
    /// A failed reply shows the error instead of whatever partial text had
    /// arrived, so it never looks like it is still streaming.
    pub fn display_text(&self) -> String {
        match &self.outcome {
            ReplyOutcome::Failed { detail } => format!("Error: {detail}"),
            ReplyOutcome::Streaming | ReplyOutcome::Complete => self.text.clone(),
        }
    }
}

impl Default for AssistantReply {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatResponse> for AssistantReply {
    fn from(response: ChatResponse) -> Self {
        Self {
            text: response.reply,
            steps: response.steps,
            references: response.references,
            outcome: ReplyOutcome::Complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_until_done() {
        let mut reply = AssistantReply::new();
        reply.apply(&StreamEvent::step("Fetching listings..."));
        reply.apply(&StreamEvent::chunk("Hello"));
        reply.apply(&StreamEvent::chunk(" world"));
        assert_eq!(reply.display_text(), "Hello world");
        assert!(!reply.is_finished());

        reply.apply(&StreamEvent::done(vec![]));
        assert_eq!(reply.outcome, ReplyOutcome::Complete);
        assert_eq!(reply.steps, vec!["Fetching listings...".to_string()]);

        reply.apply(&StreamEvent::chunk("late"));
        assert_eq!(reply.text, "Hello world");
    }

    #[test]
    fn error_replaces_partial_text() {
        let mut reply = AssistantReply::new();
        reply.apply(&StreamEvent::chunk("Half an ans"));
        reply.apply(&StreamEvent::error("model crashed"));
        assert_eq!(reply.display_text(), "Error: model crashed");
        assert!(reply.is_finished());
    }
}
