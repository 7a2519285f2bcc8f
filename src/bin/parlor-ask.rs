//! Ask the listing assistant a question from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Stream an answer over chunked HTTP (the default)
//! parlor-ask 2BHK under 30k in Baner
//!
//! # Use the WebSocket transport, falling back if it cannot connect
//! parlor-ask --transport ws --fallback furnished flats near Hinjewadi
//!
//! # Check the backend's database
//! parlor-ask --db-status
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use arrrg_derive::CommandLine;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use parlor::render::{describe_status, render_event, wait_for_interrupt};
use parlor::{
    AccumulatingStream, Assistant, ClientConfig, PlainTextRenderer, ReplyOutcome, Renderer,
    Transport, describe_error,
};

/// Command-line arguments for the parlor-ask tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
struct AskArgs {
    /// Which transport to ask over.
    #[arrrg(optional, "Transport: sync, stream or ws (default: stream)", "TRANSPORT")]
    transport: Option<String>,

    /// Try the other transports when the chosen one cannot connect.
    #[arrrg(flag, "Fall back to other transports when one cannot connect")]
    fallback: bool,

    /// YAML client configuration file.
    #[arrrg(optional, "Client configuration file (YAML)", "FILE")]
    config: Option<String>,

    /// Report on the backend's database instead of asking a question.
    #[arrrg(flag, "Show the backend's database status and exit")]
    db_status: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    no_color: bool,
}

/// The chosen transport first, then the others from most to least incremental.
fn transport_order(first: Transport, fallback: bool) -> Vec<Transport> {
    let mut order = vec![first];
    if fallback {
        for transport in [Transport::Stream, Transport::Sync, Transport::WebSocket] {
            if !order.contains(&transport) {
                order.push(transport);
            }
        }
    }
    order
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, words) = AskArgs::from_command_line_relaxed("parlor-ask [OPTIONS] <QUESTION>...");
    let config = ClientConfig::load(args.config.as_deref().map(Path::new))?;
    let assistant = Assistant::new(&config)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;
    let mut renderer =
        PlainTextRenderer::with_color(!args.no_color).with_interrupt(Arc::clone(&interrupted));
    let stop = wait_for_interrupt(&interrupted);
    tokio::pin!(stop);

    if args.db_status {
        let status = assistant.db_status().await?;
        renderer.print_info(&describe_status(&status));
        std::process::exit(if status.connected { 0 } else { 1 });
    }

    if words.is_empty() {
        eprintln!("Error: Must specify a question");
        std::process::exit(1);
    }
    let question = words.join(" ");
    let transport: Transport = args.transport.as_deref().unwrap_or("stream").parse()?;

    let order = transport_order(transport, args.fallback);
    let asked = tokio::select! {
        asked = assistant.ask_with_fallback(&question, &order) => asked,
        _ = &mut stop => {
            renderer.print_interrupted();
            std::process::exit(130);
        }
    };
    let (used, events) = match asked {
        Ok(asked) => asked,
        Err(err) => {
            renderer.print_error(&describe_error(&err));
            std::process::exit(1);
        }
    };
    if used != transport {
        renderer.print_info(&format!("({transport} unavailable, used {used})"));
    }

    let (mut events, reply) = AccumulatingStream::new(events);
    loop {
        let next = tokio::select! {
            event = events.next() => event,
            _ = &mut stop => None,
        };
        if renderer.should_interrupt() {
            renderer.print_interrupted();
            let partial = events.finalize_partial();
            tracing::debug!(chars = partial.text.len(), "answer interrupted");
            std::process::exit(130);
        }
        let Some(event) = next else { break };
        render_event(&mut renderer, &event);
    }

    let reply = reply.await?;
    if let ReplyOutcome::Failed { .. } = reply.outcome {
        std::process::exit(1);
    }
    Ok(())
}
