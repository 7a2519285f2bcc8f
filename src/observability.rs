use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("parlor.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("parlor.client.request_errors");
pub(crate) static CLIENT_REQUEST_ABORTS: Counter = Counter::new("parlor.client.request_aborts");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("parlor.client.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("parlor.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("parlor.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("parlor.stream.bytes");
pub(crate) static STREAM_WS_OPEN_FAILURES: Counter =
    Counter::new("parlor.stream.ws_open_failures");
pub(crate) static STREAM_FALLBACKS: Counter = Counter::new("parlor.stream.fallbacks");

pub(crate) static SOCKET_CONNECTS: Counter = Counter::new("parlor.socket.connects");
pub(crate) static SOCKET_CONNECT_FAILURES: Counter =
    Counter::new("parlor.socket.connect_failures");
pub(crate) static SOCKET_DISCONNECTS: Counter = Counter::new("parlor.socket.disconnects");
pub(crate) static SOCKET_RECONNECT_EXHAUSTED: Counter =
    Counter::new("parlor.socket.reconnect_exhausted");
pub(crate) static SOCKET_EMITS: Counter = Counter::new("parlor.socket.emits");
pub(crate) static SOCKET_DISPATCHES: Counter = Counter::new("parlor.socket.dispatches");
pub(crate) static SOCKET_BAD_FRAMES: Counter = Counter::new("parlor.socket.bad_frames");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_counter(&CLIENT_REQUEST_ABORTS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_WS_OPEN_FAILURES);
    collector.register_counter(&STREAM_FALLBACKS);

    collector.register_counter(&SOCKET_CONNECTS);
    collector.register_counter(&SOCKET_CONNECT_FAILURES);
    collector.register_counter(&SOCKET_DISCONNECTS);
    collector.register_counter(&SOCKET_RECONNECT_EXHAUSTED);
    collector.register_counter(&SOCKET_EMITS);
    collector.register_counter(&SOCKET_DISPATCHES);
    collector.register_counter(&SOCKET_BAD_FRAMES);
}
