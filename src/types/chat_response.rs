use serde::{Deserialize, Serialize};

use crate::types::ListingReference;

/// Body of every assistant request: a natural-language question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The question.
    pub message: String,
}

impl ChatRequest {
    /// Create a new request for the given question.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A completed assistant answer, as returned by the synchronous and voice endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The answer text.
    pub reply: String,
    /// Listings the answer refers to.  Malformed entries are skipped.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "ListingReference::deserialize_list"
    )]
    pub references: Vec<ListingReference>,
    /// Progress labels for the work the backend performed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
}
