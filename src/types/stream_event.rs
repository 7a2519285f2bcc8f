use serde::{Deserialize, Serialize};

use crate::types::ListingReference;

/// One element of an incrementally delivered assistant answer.
///
/// Every transport produces the same vocabulary: any number of `Step` and
/// `Chunk` events followed by exactly one `Done` or `Error`.  Nothing follows
/// the terminal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// A human-readable progress label.
    Step {
        /// The label.
        message: String,
    },
    /// An incremental text fragment; fragments concatenate in arrival order.
    Chunk {
        /// The fragment.
        content: String,
    },
    /// The answer is complete.
    Done {
        /// Listings the answer refers to.
        #[serde(default)]
        references: Vec<ListingReference>,
    },
    /// The answer failed part way.
    Error {
        /// What went wrong.
        detail: String,
    },
}

impl StreamEvent {
    /// Create a step event.
    pub fn step(message: impl Into<String>) -> Self {
        StreamEvent::Step {
            message: message.into(),
        }
    }

    /// Create a chunk event.
    pub fn chunk(content: impl Into<String>) -> Self {
        StreamEvent::Chunk {
            content: content.into(),
        }
    }

    /// Create a done event.
    pub fn done(references: Vec<ListingReference>) -> Self {
        StreamEvent::Done { references }
    }

    /// Create an error event.
    pub fn error(detail: impl Into<String>) -> Self {
        StreamEvent::Error {
            detail: detail.into(),
        }
    }

    /// True for `Done` and `Error`, the events that end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }

    /// The wire name of this event's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Step { .. } => "step",
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Done { .. } => "done",
            StreamEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tagged_serialization() {
        assert_eq!(
            serde_json::to_value(StreamEvent::chunk("Hello")).unwrap(),
            json!({"type": "chunk", "content": "Hello"})
        );
        assert_eq!(
            serde_json::to_value(StreamEvent::done(vec![])).unwrap(),
            json!({"type": "done", "references": []})
        );
    }

    #[test]
    fn terminal_kinds() {
        assert!(!StreamEvent::step("Fetching listings...").is_terminal());
        assert!(!StreamEvent::chunk("x").is_terminal());
        assert!(StreamEvent::done(vec![]).is_terminal());
        assert!(StreamEvent::error("boom").is_terminal());
        assert_eq!(StreamEvent::error("boom").kind(), "error");
    }
}
