//! Logging trait for assistant client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture
//! and log all assistant interactions passing through the [`Assistant`] client.
//!
//! [`Assistant`]: crate::Assistant

use crate::{ChatResponse, StreamEvent};

/// A trait for logging assistant client operations.
///
/// Implement this trait to capture and record all assistant interactions,
/// including completed answers and individual streaming events.
///
/// # Example
///
/// ```rust,ignore
/// use parlor::{ChatResponse, ClientLogger, StreamEvent};
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ClientLogger for FileLogger {
///     fn log_response(&self, response: &ChatResponse) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Response: {}", serde_json::to_string(response).unwrap()).unwrap();
///     }
///
///     fn log_stream_event(&self, event: &StreamEvent) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Stream event: {}", serde_json::to_string(event).unwrap()).unwrap();
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log a completed answer from `chat` or `voice`.
    fn log_response(&self, response: &ChatResponse);

    /// Log an individual streaming event.
    ///
    /// Called for every [`StreamEvent`] yielded by a stream, including the
    /// terminal `done` or `error`.
    fn log_stream_event(&self, event: &StreamEvent);
}
