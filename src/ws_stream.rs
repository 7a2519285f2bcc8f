//! Answer streaming over a dedicated, one-shot WebSocket.
//!
//! Each question opens its own socket: send `{"message": ...}` once it is
//! open, then read JSON frames tagged by `type` until a `done` or `error`
//! arrives or the socket closes.  The socket is closed as soon as the
//! terminal event is produced.

use std::time::Duration;

use futures::stream::{self, Stream};
use futures::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::error::{Error, Result};
use crate::observability::{STREAM_ERRORS, STREAM_EVENTS, STREAM_WS_OPEN_FAILURES};
use crate::types::{ChatRequest, ListingReference, StreamEvent};

/// Detail for a socket that went away without a close frame.
pub const CONNECTION_FAILED: &str =
    "Connection failed (is the backend running and proxy/ws enabled?)";

/// Detail for a frame that is not JSON.
pub const INVALID_MESSAGE: &str = "Invalid server message";

/// Detail for an `error` frame without one.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Classify one text frame.  `None` means the frame is ignored.
pub fn classify_frame(text: &str) -> Option<StreamEvent> {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Some(StreamEvent::error(INVALID_MESSAGE));
    };
    match text_field(&value, "type")? {
        "step" => text_field(&value, "message").map(StreamEvent::step),
        "chunk" => text_field(&value, "content").map(StreamEvent::chunk),
        "done" => Some(StreamEvent::done(ListingReference::list_from(
            value.get("references"),
        ))),
        "error" => Some(StreamEvent::error(
            text_field(&value, "detail").unwrap_or(UNKNOWN_ERROR),
        )),
        _ => None,
    }
}

fn text_field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value.get(name).and_then(Value::as_str)
}

/// The `error` detail for a socket closed before any terminal event.
///
/// A server-supplied reason wins; otherwise the close code is reported, with
/// abnormal closure (1006) spelled out as a connection failure.
pub fn close_detail(frame: Option<&CloseFrame>) -> String {
    match frame {
        Some(frame) if !frame.reason.as_str().is_empty() => frame.reason.as_str().to_string(),
        Some(frame) => match u16::from(frame.code) {
            1006 => CONNECTION_FAILED.to_string(),
            code => format!("Closed {code}"),
        },
        // A close frame without a status reads as 1005.
        None => "Closed 1005".to_string(),
    }
}

/// Open `url`, send `message`, and stream the answer.
///
/// Opening is bounded by `open_timeout`.  Expiry yields [`Error::Timeout`] and
/// an open failure yields [`Error::Connection`]; neither produces any event,
/// so the caller may fall back to another transport.
pub async fn connect(
    url: &str,
    message: &str,
    open_timeout: Duration,
) -> Result<impl Stream<Item = StreamEvent> + Send + 'static> {
    let opened = tokio::time::timeout(open_timeout, connect_async(url)).await;
    let (mut socket, _response) = match opened {
        Err(_) => {
            STREAM_WS_OPEN_FAILURES.click();
            return Err(Error::timeout(
                "WebSocket connection timed out. Try Stream without WebSocket or check the AI backend.",
                Some(open_timeout.as_secs_f64()),
            ));
        }
        Ok(Err(err)) => {
            STREAM_WS_OPEN_FAILURES.click();
            return Err(Error::connection(
                "WebSocket failed to open. Use Stream without WebSocket or ensure the AI backend is running.",
                Some(Box::new(err)),
            ));
        }
        Ok(Ok(opened)) => opened,
    };

    let request = serde_json::to_string(&ChatRequest::new(message))?;
    socket
        .send(Message::Text(request.into()))
        .await
        .map_err(|e| Error::connection(format!("failed to send question: {e}"), Some(Box::new(e))))?;
    tracing::debug!(url = url, "answer socket open");
    Ok(events(socket))
}

/// Read answer events from an already-open socket.
pub fn events<S>(socket: S) -> impl Stream<Item = StreamEvent> + Send + 'static
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin
        + Send
        + 'static,
{
    stream::unfold(Some(socket), |socket| async move {
        let mut socket = socket?;
        let event = loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = classify_frame(text.as_str()) {
                        break event;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let classified = match std::str::from_utf8(&bytes) {
                        Ok(text) => classify_frame(text),
                        Err(_) => Some(StreamEvent::error(INVALID_MESSAGE)),
                    };
                    if let Some(event) = classified {
                        break event;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break StreamEvent::error(close_detail(frame.as_ref()));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(error = %err, "answer socket failed");
                    break StreamEvent::error(CONNECTION_FAILED);
                }
                None => break StreamEvent::error(CONNECTION_FAILED),
            }
        };

        STREAM_EVENTS.click();
        if !event.is_terminal() {
            return Some((event, Some(socket)));
        }
        if matches!(event, StreamEvent::Error { .. }) {
            STREAM_ERRORS.click();
        }
        if let Err(err) = socket.close().await {
            tracing::debug!(error = %err, "error closing answer socket");
        }
        Some((event, None))
    })
}
