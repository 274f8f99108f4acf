//! Minimal probe: load a schema dump, listen for the engine, and log
//! everything the session reports. On a breakpoint hit it immediately
//! asks for the call stack and the local variables.
//!
//! Run with:
//! ```text
//! REMOTE_TOOLS_SCHEMA=remote_tools_classes.json cargo run --example attach
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use remote_tools_protocol::config::ProbeConfig;
use remote_tools_protocol::core::SchemaRegistry;
use remote_tools_protocol::protocol::messages::{request, DEFAULT_CONTEXT};
use remote_tools_protocol::protocol::session::{SessionCommand, SessionEvent};
use remote_tools_protocol::utils::logging;
use remote_tools_protocol::{transport, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ProbeConfig::from_env()?;
    match config.logging.level.parse() {
        Ok(level) => logging::init_with_level(level),
        Err(_) => logging::init(),
    }
    for problem in config.validate() {
        warn!(problem = %problem, "configuration issue");
    }

    let registry = Arc::new(SchemaRegistry::load_from_file(&config.schema.path)?);
    info!(
        classes = registry.len(),
        schema = %config.schema.path.display(),
        "schema loaded"
    );

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match &event {
                SessionEvent::BreakpointHit { module_name, line } => {
                    info!(module = %module_name, line, "breakpoint hit");
                    let _ = commands_tx.send(SessionCommand::Request {
                        request: request::GET_CALLSTACK.into(),
                        context: DEFAULT_CONTEXT.into(),
                    });
                    let _ = commands_tx.send(SessionCommand::Request {
                        request: request::ENUM_LOCALS.into(),
                        context: DEFAULT_CONTEXT.into(),
                    });
                }
                SessionEvent::CallStack(stack) => info!(%stack, "call stack"),
                other => info!(event = ?other, "session event"),
            }
        }
    });

    transport::serve(&config.listen_addr(), registry, events_tx, commands_rx).await
}
