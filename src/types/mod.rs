// Public modules
pub mod assistant_reply;
pub mod chat_message;
pub mod chat_response;
pub mod db_status;
pub mod envelope;
pub mod listing_reference;
pub mod live_update;
pub mod stream_event;
pub mod typing_signal;

// Re-exports
pub use assistant_reply::{AssistantReply, ReplyOutcome};
pub use chat_message::{ChatMessage, ChatSender, SendMessagePayload};
pub use chat_response::{ChatRequest, ChatResponse};
pub use db_status::{DbStatus, DbStatusCollection};
pub use envelope::Envelope;
pub use listing_reference::ListingReference;
pub use live_update::{LiveUpdate, LiveUpdateAction};
pub use stream_event::StreamEvent;
pub use typing_signal::TypingSignal;
