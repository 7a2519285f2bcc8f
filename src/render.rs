//! Output rendering for assistant answers and room chat.
//!
//! This module provides the [`Renderer`] trait and a plain-text
//! implementation with optional ANSI styling.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::types::{ChatMessage, DbStatus, ListingReference, StreamEvent};

/// ANSI escape code for dim text (used for steps and timestamps).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for sender names).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for references).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for italic text (used for typing indicators).
const ANSI_ITALIC: &str = "\x1b[3m";

/// Trait for rendering answer events and room activity.
pub trait Renderer: Send {
    /// Print a progress label.
    fn print_step(&mut self, step: &str);

    /// Print a fragment of answer text.  Called incrementally.
    fn print_chunk(&mut self, text: &str);

    /// Print the listings an answer refers to.
    fn print_references(&mut self, references: &[ListingReference]);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print a room message.  `mine` is true for the local user's messages.
    fn print_message(&mut self, message: &ChatMessage, mine: bool);

    /// Print who is typing.
    fn print_typing(&mut self, label: &str);

    /// Called when an answer is complete.
    fn finish_response(&mut self);

    /// Called when an answer is interrupted by the user.
    fn print_interrupted(&mut self) {}

    /// Returns true if rendering should stop.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Render one answer event.
pub fn render_event(renderer: &mut dyn Renderer, event: &StreamEvent) {
    match event {
        StreamEvent::Step { message } => renderer.print_step(message),
        StreamEvent::Chunk { content } => renderer.print_chunk(content),
        StreamEvent::Done { references } => {
            renderer.finish_response();
            if !references.is_empty() {
                renderer.print_references(references);
            }
        }
        StreamEvent::Error { detail } => {
            renderer.finish_response();
            renderer.print_error(detail);
        }
    }
}

/// One line describing a reference, such as `2BHK in Baner (Baner, Pune) 25000, 2 bed`.
pub fn describe_reference(reference: &ListingReference) -> String {
    let mut line = if reference.title.is_empty() {
        reference.id.clone()
    } else {
        reference.title.clone()
    };
    let place: Vec<&str> = [&reference.locality, &reference.city]
        .into_iter()
        .map(String::as_str)
        .filter(|part| !part.is_empty())
        .collect();
    if !place.is_empty() {
        line.push_str(&format!(" ({})", place.join(", ")));
    }
    let mut facts = Vec::new();
    if let Some(price) = reference.price {
        facts.push(format!("{price}"));
    }
    if let Some(bedrooms) = reference.bedrooms {
        facts.push(format!("{bedrooms} bed"));
    }
    if let Some(area) = reference.area {
        facts.push(format!("{area} sq ft"));
    }
    if !facts.is_empty() {
        line.push(' ');
        line.push_str(&facts.join(", "));
    }
    line
}

/// One line describing a backend status report.
pub fn describe_status(status: &DbStatus) -> String {
    if !status.connected {
        return match &status.error {
            Some(error) => format!("database unavailable: {error}"),
            None => "database unavailable".to_string(),
        };
    }
    let collections: Vec<String> = status
        .collections
        .iter()
        .map(|collection| format!("{} {}", collection.name, collection.count))
        .collect();
    if collections.is_empty() {
        format!("connected to {}", status.database)
    } else {
        format!("connected to {} ({})", status.database, collections.join(", "))
    }
}

/// How often [`wait_for_interrupt`] checks its flag.
pub const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// Resolves once `flag` is set.  Race it against the event stream so an
/// interrupt lands even while no events arrive.
pub async fn wait_for_interrupt(flag: &AtomicBool) {
    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(INTERRUPT_POLL).await;
    }
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    line_start: bool,
    interrupted: Option<Arc<AtomicBool>>,
}

impl PlainTextRenderer<Stdout> {
    /// Creates a renderer for stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a renderer for stdout with the specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer writing to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            line_start: true,
            interrupted: None,
        }
    }

    /// Attaches an interrupt flag to the renderer.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
        self.line_start = text.ends_with('\n');
    }

    /// Write a whole line, starting a fresh one first if needed.
    fn write_line(&mut self, style: &str, text: &str) {
        let mut line = String::new();
        if !self.line_start {
            line.push('\n');
        }
        if self.use_color && !style.is_empty() {
            line.push_str(style);
            line.push_str(text);
            line.push_str(ANSI_RESET);
        } else {
            line.push_str(text);
        }
        line.push('\n');
        self.write(&line);
    }
}

impl Default for PlainTextRenderer<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn print_step(&mut self, step: &str) {
        self.write_line(ANSI_DIM, &format!("[{step}]"));
    }

    fn print_chunk(&mut self, text: &str) {
        self.write(text);
    }

    fn print_references(&mut self, references: &[ListingReference]) {
        for reference in references {
            let line = format!("  - {}", describe_reference(reference));
            self.write_line(ANSI_GREEN, &line);
        }
    }

    fn print_error(&mut self, error: &str) {
        self.write_line(ANSI_RED, &format!("Error: {error}"));
    }

    fn print_info(&mut self, info: &str) {
        self.write_line("", info);
    }

    fn print_message(&mut self, message: &ChatMessage, mine: bool) {
        let who = if mine {
            "you"
        } else {
            match message.sender_name.as_deref() {
                Some(name) if !name.is_empty() => name,
                _ if !message.sender_id.is_empty() => &message.sender_id,
                _ => "anonymous",
            }
        };
        let when = message
            .timestamp
            .map(|at| format!("{:02}:{:02} ", at.hour(), at.minute()))
            .unwrap_or_default();
        let line = if self.use_color {
            format!("{ANSI_DIM}{when}{ANSI_RESET}{ANSI_CYAN}{who}{ANSI_RESET}: {}", message.content)
        } else {
            format!("{when}{who}: {}", message.content)
        };
        self.write_line("", &line);
    }

    fn print_typing(&mut self, label: &str) {
        self.write_line(ANSI_ITALIC, &format!("{label} is typing..."));
    }

    fn finish_response(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }

    fn print_interrupted(&mut self) {
        self.write_line("", "[interrupted]");
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::types::DbStatusCollection;

    fn rendered(events: &[StreamEvent]) -> String {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        for event in events {
            render_event(&mut renderer, event);
        }
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn answer_layout() {
        let reference = ListingReference {
            id: "42".to_string(),
            title: "2BHK in Baner".to_string(),
            city: "Pune".to_string(),
            locality: "Baner".to_string(),
            price: Some(25000.0),
            bedrooms: Some(2.0),
            ..ListingReference::default()
        };
        let output = rendered(&[
            StreamEvent::step("Fetching listings..."),
            StreamEvent::chunk("Hello"),
            StreamEvent::chunk(" world"),
            StreamEvent::done(vec![reference]),
        ]);
        assert_eq!(
            output,
            "[Fetching listings...]\nHello world\n  - 2BHK in Baner (Baner, Pune) 25000, 2 bed\n"
        );
    }

    #[test]
    fn error_after_partial_text() {
        let output = rendered(&[StreamEvent::chunk("Half"), StreamEvent::error("boom")]);
        assert_eq!(output, "Half\nError: boom\n");
    }

    #[test]
    fn reference_without_title_uses_id() {
        let reference = ListingReference {
            id: "plot-7".to_string(),
            ..ListingReference::default()
        };
        assert_eq!(describe_reference(&reference), "plot-7");
    }

    #[test]
    fn messages_and_typing() {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        let message = ChatMessage {
            room_id: "listing-42".to_string(),
            content: "Is it still available?".to_string(),
            sender_id: "u-2".to_string(),
            sender_name: Some("Asha".to_string()),
            timestamp: Some(datetime!(2025-03-01 09:05 UTC)),
        };
        renderer.print_message(&message, false);
        renderer.print_message(&message, true);
        renderer.print_typing("Asha");
        let output = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(
            output,
            "09:05 Asha: Is it still available?\n09:05 you: Is it still available?\nAsha is typing...\n"
        );
    }

    #[test]
    fn status_lines() {
        assert_eq!(
            describe_status(&DbStatus::unavailable("Service Unavailable")),
            "database unavailable: Service Unavailable"
        );
        let status = DbStatus {
            connected: true,
            database: "estates".to_string(),
            collections: vec![DbStatusCollection {
                name: "listings".to_string(),
                count: 120,
            }],
            ..DbStatus::default()
        };
        assert_eq!(describe_status(&status), "connected to estates (listings 120)");
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_beats_a_silent_stream() {
        let flag = Arc::new(AtomicBool::new(false));
        assert!(
            tokio::time::timeout(Duration::from_secs(5), wait_for_interrupt(&flag))
                .await
                .is_err()
        );

        let setter = Arc::clone(&flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            setter.store(true, Ordering::Relaxed);
        });
        let mut silent = futures::stream::pending::<StreamEvent>();
        let interrupted = tokio::select! {
            _ = futures::StreamExt::next(&mut silent) => false,
            _ = wait_for_interrupt(&flag) => true,
        };
        assert!(interrupted);
    }
}
