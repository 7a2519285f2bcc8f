use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::Stream;
use futures::stream::{self, StreamExt};
use reqwest::header::{self, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use serde_json::Value;

use crate::client_logger::ClientLogger;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_ABORTS, CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS,
    STREAM_FALLBACKS,
};
use crate::sse::process_sse;
use crate::types::{ChatRequest, ChatResponse, DbStatus, StreamEvent};
use crate::ws_stream;

/// What to tell the user when the synchronous call hit its deadline.
pub const ABORT_HINT: &str = "Request took too long. Try Stream mode for faster first response.";

const CHAT_FAILED: &str = "AI request failed";
const STREAM_FAILED: &str = "AI stream failed";
const VOICE_FAILED: &str = "Voice request failed";
const TTS_FAILED: &str = "TTS failed";
const DB_STATUS_FAILED: &str = "DB status request failed";

/// A boxed answer stream.  Every transport produces one of these.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// How to ask the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// One request, one completed answer.
    Sync,
    /// A chunked HTTP response decoded as it arrives.
    Stream,
    /// A dedicated WebSocket per question.
    WebSocket,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Sync => "sync",
            Transport::Stream => "stream",
            Transport::WebSocket => "ws",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(Transport::Sync),
            "stream" => Ok(Transport::Stream),
            "ws" | "websocket" => Ok(Transport::WebSocket),
            _ => Err(Error::validation(
                format!("unknown transport {s:?}; expected sync, stream or ws"),
                Some("transport".to_string()),
            )),
        }
    }
}

/// Client for the assistant backend.
#[derive(Clone)]
pub struct Assistant {
    client: ReqwestClient,
    base_url: String,
    ws_url: String,
    chat_timeout: Duration,
    ws_open_timeout: Duration,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl Assistant {
    /// Create a client for the backend described by `config`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        // No client-wide timeout: streams may legitimately run long.  Each
        // call applies its own deadline.
        let client = ReqwestClient::builder().build().map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {}", e),
                Some(Box::new(e)),
            )
        })?;
        Ok(Self {
            client,
            base_url: config.ai_url.trim_end_matches('/').to_string(),
            ws_url: config.ai_ws_base()?,
            chat_timeout: config.chat_timeout(),
            ws_open_timeout: config.ws_open_timeout(),
            logger: None,
        })
    }

    /// Attach a logger that sees every completed answer and stream event.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_chat_timeout(mut self, timeout: Duration) -> Self {
        self.chat_timeout = timeout;
        self
    }

    pub fn with_ws_open_timeout(mut self, timeout: Duration) -> Self {
        self.ws_open_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and turn transport failures and non-2xx statuses into errors.
    async fn execute(&self, request: RequestBuilder, fallback: &str) -> Result<Response> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let response = request.send().await.map_err(|e| {
            CLIENT_REQUEST_ERRORS.click();
            map_request_error(e)
        })?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(error_from_response(response, fallback).await);
        }
        Ok(response)
    }

    /// Ask a question and wait for the whole answer.
    ///
    /// Gives up after the chat timeout with [`Error::Abort`].  The deadline is
    /// longer than the backend's own, so a backend timeout normally arrives
    /// first as a 504 (see [`Error::is_timeout`]).
    pub async fn chat(&self, message: &str) -> Result<ChatResponse> {
        let request = self
            .client
            .post(self.endpoint("/ai/chat"))
            .json(&ChatRequest::new(message));
        let call = async {
            let response = self.execute(request, CHAT_FAILED).await?;
            response.json::<ChatResponse>().await.map_err(|e| {
                Error::serialization(
                    format!("Failed to parse response: {}", e),
                    Some(Box::new(e)),
                )
            })
        };
        let response = match tokio::time::timeout(self.chat_timeout, call).await {
            Ok(response) => response?,
            Err(_) => {
                CLIENT_REQUEST_ABORTS.click();
                return Err(Error::abort(format!(
                    "no answer within {} seconds",
                    self.chat_timeout.as_secs_f64()
                )));
            }
        };
        if let Some(logger) = &self.logger {
            logger.log_response(&response);
        }
        Ok(response)
    }

    /// Ask a question and decode the chunked answer as it arrives.
    pub async fn stream(&self, message: &str) -> Result<EventStream> {
        let request = self
            .client
            .post(self.endpoint("/ai/chat/stream"))
            .header(header::ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(&ChatRequest::new(message));
        let response = self.execute(request, STREAM_FAILED).await?;
        Ok(self.observe(process_sse(response.bytes_stream())))
    }

    /// Ask a question over a dedicated WebSocket.
    ///
    /// Failing to open the socket is an error, not an event, so the caller
    /// can retry with another transport.
    pub async fn stream_ws(&self, message: &str) -> Result<EventStream> {
        let url = format!("{}/ai/ws", self.ws_url);
        let events = ws_stream::connect(&url, message, self.ws_open_timeout).await?;
        Ok(self.observe(events))
    }

    /// Ask a question over `transport`.
    ///
    /// The synchronous transport is replayed as events: its steps, then the
    /// whole reply as one chunk, then `done`.
    pub async fn ask(&self, message: &str, transport: Transport) -> Result<EventStream> {
        match transport {
            Transport::Sync => Ok(self.observe(replay(self.chat(message).await?))),
            Transport::Stream => self.stream(message).await,
            Transport::WebSocket => self.stream_ws(message).await,
        }
    }

    /// Try `transports` in order, moving on only when one cannot be set up.
    ///
    /// Returns the transport that worked along with its stream.  Request
    /// failures such as an error status are returned at once.
    pub async fn ask_with_fallback(
        &self,
        message: &str,
        transports: &[Transport],
    ) -> Result<(Transport, EventStream)> {
        let mut last = None;
        for (index, transport) in transports.iter().enumerate() {
            match self.ask(message, *transport).await {
                Ok(events) => return Ok((*transport, events)),
                Err(err) if err.is_transport_setup() && index + 1 < transports.len() => {
                    STREAM_FALLBACKS.click();
                    tracing::warn!(transport = %transport, error = %err, "falling back to the next transport");
                    last = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last.unwrap_or_else(|| {
            Error::validation("no transport to try", Some("transports".to_string()))
        }))
    }

    /// Upload a recorded question and wait for the answer.
    pub async fn voice(&self, audio: Vec<u8>, file_name: &str) -> Result<ChatResponse> {
        let form = Form::new().part("audio", Part::bytes(audio).file_name(file_name.to_string()));
        let request = self.client.post(self.endpoint("/ai/voice")).multipart(form);
        let response = self.execute(request, VOICE_FAILED).await?;
        let response = response.json::<ChatResponse>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })?;
        if let Some(logger) = &self.logger {
            logger.log_response(&response);
        }
        Ok(response)
    }

    /// Synthesize speech for `message`.  Returns the encoded audio.
    pub async fn tts(&self, message: &str) -> Result<Bytes> {
        let request = self
            .client
            .post(self.endpoint("/ai/voice/tts"))
            .json(&ChatRequest::new(message));
        let response = self.execute(request, TTS_FAILED).await?;
        response.bytes().await.map_err(|e| {
            Error::streaming(format!("Failed to read audio: {}", e), Some(Box::new(e)))
        })
    }

    /// Report on the backend's data store.
    ///
    /// A non-success status is not an error: it is reported as a
    /// disconnected status carrying the status text.
    pub async fn db_status(&self) -> Result<DbStatus> {
        CLIENT_REQUESTS.click();
        let response = self
            .client
            .get(self.endpoint("/ai/db-status"))
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                map_request_error(e)
            })?;
        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or(DB_STATUS_FAILED);
            return Ok(DbStatus::unavailable(reason));
        }
        response.json::<DbStatus>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse status: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    fn observe<S>(&self, events: S) -> EventStream
    where
        S: Stream<Item = StreamEvent> + Send + 'static,
    {
        match &self.logger {
            Some(logger) => {
                let logger = Arc::clone(logger);
                Box::pin(events.inspect(move |event| logger.log_stream_event(event)))
            }
            None => Box::pin(events),
        }
    }
}

impl fmt::Debug for Assistant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assistant")
            .field("base_url", &self.base_url)
            .field("ws_url", &self.ws_url)
            .field("chat_timeout", &self.chat_timeout)
            .field("ws_open_timeout", &self.ws_open_timeout)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// Present a completed answer as an event stream.
///
/// ```
/// # use futures::StreamExt;
/// # use parlor::{ChatResponse, StreamEvent};
/// # tokio_test::block_on(async {
/// let response = ChatResponse {
///     reply: "Two listings match.".to_string(),
///     references: Vec::new(),
///     steps: vec!["Searching listings".to_string()],
/// };
/// let events: Vec<StreamEvent> = parlor::client::replay(response).collect().await;
/// assert_eq!(events[0], StreamEvent::step("Searching listings"));
/// assert_eq!(events[1], StreamEvent::chunk("Two listings match."));
/// assert!(events[2].is_terminal());
/// # });
/// ```
pub fn replay(response: ChatResponse) -> impl Stream<Item = StreamEvent> + Send + 'static {
    let ChatResponse {
        reply,
        references,
        steps,
    } = response;
    let events: Vec<StreamEvent> = steps
        .into_iter()
        .map(StreamEvent::step)
        .chain([StreamEvent::chunk(reply), StreamEvent::done(references)])
        .collect();
    stream::iter(events)
}

/// Extract the message to show for a failed request.
///
/// A JSON body with a string `message` wins.  A JSON body without one yields
/// `fallback`.  A missing or unparseable body yields the status text, or
/// `fallback` when that is empty too.
pub fn error_message(body: Option<&str>, status_text: &str, fallback: &str) -> String {
    let parsed = body
        .filter(|body| !body.trim().is_empty())
        .and_then(|body| serde_json::from_str::<Value>(body).ok());
    match parsed {
        Some(value) => value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(fallback)
            .to_string(),
        None if status_text.is_empty() => fallback.to_string(),
        None => status_text.to_string(),
    }
}

/// The text to show a user for `err`.
pub fn describe_error(err: &Error) -> String {
    if err.is_abort() {
        ABORT_HINT.to_string()
    } else {
        err.message().to_string()
    }
}

async fn error_from_response(response: Response, fallback: &str) -> Error {
    let status = response.status();
    let status_text = status.canonical_reason().unwrap_or_default();
    let body = match response.text().await {
        Ok(body) => Some(body),
        Err(e) => {
            tracing::debug!(error = %e, "failed to read error body");
            None
        }
    };
    let message = error_message(body.as_deref(), status_text, fallback);
    tracing::debug!(status = status.as_u16(), message = %message, "request failed");
    Error::api(status.as_u16(), message)
}

fn map_request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(format!("Request timed out: {}", e), None)
    } else if e.is_connect() {
        Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
    } else {
        Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ListingReference;

    #[test]
    fn client_creation() {
        let assistant = Assistant::new(&ClientConfig::new()).unwrap();
        assert_eq!(assistant.base_url(), "http://localhost:8001");
        assert_eq!(assistant.ws_url(), "ws://localhost:8001");
        let debug = format!("{assistant:?}");
        assert!(debug.contains("chat_timeout: 95s"));
    }

    #[test]
    fn bad_ai_url_is_rejected() {
        let config = ClientConfig::new().with_ai_url("not a url");
        assert!(Assistant::new(&config).is_err());
    }

    #[test]
    fn transport_names() {
        assert_eq!("sync".parse::<Transport>().unwrap(), Transport::Sync);
        assert_eq!("Stream".parse::<Transport>().unwrap(), Transport::Stream);
        assert_eq!("websocket".parse::<Transport>().unwrap(), Transport::WebSocket);
        assert_eq!(Transport::WebSocket.to_string(), "ws");
        assert!("carrier-pigeon".parse::<Transport>().unwrap_err().is_validation());
    }

    #[test]
    fn error_message_prefers_json_message() {
        assert_eq!(
            error_message(Some(r#"{"message":"Quota exceeded"}"#), "Too Many Requests", CHAT_FAILED),
            "Quota exceeded"
        );
        assert_eq!(
            error_message(Some(r#"{"detail":"nope"}"#), "Bad Request", CHAT_FAILED),
            "AI request failed"
        );
        assert_eq!(
            error_message(Some("<html>502</html>"), "Bad Gateway", CHAT_FAILED),
            "Bad Gateway"
        );
        assert_eq!(error_message(None, "Bad Gateway", CHAT_FAILED), "Bad Gateway");
        assert_eq!(error_message(Some(""), "", TTS_FAILED), "TTS failed");
    }

    #[test]
    fn error_message_is_stable() {
        let body = Some(r#"{"message": 7}"#);
        let first = error_message(body, "Internal Server Error", STREAM_FAILED);
        assert_eq!(first, error_message(body, "Internal Server Error", STREAM_FAILED));
        assert_eq!(first, "AI stream failed");
    }

    #[test]
    fn abort_gets_a_hint() {
        assert_eq!(describe_error(&Error::abort("no answer")), ABORT_HINT);
        assert_eq!(
            describe_error(&Error::api(500, "Database unavailable")),
            "Database unavailable"
        );
    }

    #[tokio::test]
    async fn replay_orders_steps_then_reply() {
        let response = ChatResponse {
            reply: "Two flats in Baner.".to_string(),
            references: vec![ListingReference {
                id: "42".to_string(),
                ..ListingReference::default()
            }],
            steps: vec!["Searching".to_string(), "Ranking".to_string()],
        };
        let events: Vec<StreamEvent> = replay(response.clone()).collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::step("Searching"),
                StreamEvent::step("Ranking"),
                StreamEvent::chunk("Two flats in Baner."),
                StreamEvent::done(response.references),
            ]
        );
    }

    #[tokio::test]
    async fn fallback_needs_a_transport() {
        let assistant = Assistant::new(&ClientConfig::new()).unwrap();
        let Err(err) = assistant.ask_with_fallback("hi", &[]).await else {
            panic!("expected an error");
        };
        assert!(err.is_validation());
    }
}
