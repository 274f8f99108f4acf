//! TCP server hosting the debug session.
//!
//! The engine is the connecting side: the tool listens on a local port
//! (backlog of one, a single engine at a time) and the engine dials in
//! when remote tools are enabled. Within a connection, all decode and
//! dispatch work happens synchronously as chunks arrive; the transport
//! only moves bytes.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::core::schema::SchemaRegistry;
use crate::error::{ProtocolError, Result};
use crate::protocol::session::{Session, SessionCommand, SessionEvent};

/// Start the server with a ctrl-c handler wired to graceful shutdown.
#[instrument(skip(registry, events, commands))]
pub async fn serve(
    addr: &str,
    registry: Arc<SchemaRegistry>,
    events: mpsc::UnboundedSender<SessionEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("received ctrl-c, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    serve_with_shutdown(addr, registry, events, commands, shutdown_rx).await
}

/// Start the server with an external shutdown channel.
#[instrument(skip(registry, events, commands, shutdown_rx))]
pub async fn serve_with_shutdown(
    addr: &str,
    registry: Arc<SchemaRegistry>,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let listener = bind_single(addr)?;
    info!(address = %addr, "listening for engine connection");

    loop {
        let _ = events.send(SessionEvent::WaitingForConnection);

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("shutting down server");
                return Ok(());
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        info!(peer = %peer, "engine connected");
                        match run_connection(
                            stream,
                            &registry,
                            &events,
                            &mut commands,
                            &mut shutdown_rx,
                        )
                        .await
                        {
                            Ok(KeepServing::Yes) => {}
                            Ok(KeepServing::No) => return Ok(()),
                            Err(e) => {
                                error!(error = %e, "connection ended with error");
                            }
                        }
                        let _ = events.send(SessionEvent::Disconnected);
                    }
                    Err(e) => {
                        error!(error = %e, "error accepting connection");
                    }
                }
            }
        }
    }
}

enum KeepServing {
    Yes,
    No,
}

/// Bind with a backlog of one; a second engine dialing in while a
/// connection is active is refused rather than queued.
fn bind_single(addr: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| ProtocolError::ConfigError(format!("invalid listen address {addr:?}: {e}")))?;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.bind(addr)?;
    Ok(socket.listen(1)?)
}

async fn run_connection(
    mut stream: TcpStream,
    registry: &Arc<SchemaRegistry>,
    events: &mpsc::UnboundedSender<SessionEvent>,
    commands: &mut mpsc::UnboundedReceiver<SessionCommand>,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Result<KeepServing> {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let mut session = Session::new(registry.clone(), events.clone(), outbound_tx);
    let mut read_buf = vec![0u8; 16 * 1024];

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("closing connection for shutdown");
                return Ok(KeepServing::No);
            }

            read = stream.read(&mut read_buf) => {
                let n = read?;
                if n == 0 {
                    info!("engine closed the connection");
                    return Ok(KeepServing::Yes);
                }
                session.handle_bytes(&read_buf[..n])?;
            }

            command = commands.recv() => {
                match command {
                    Some(command) => session.apply_command(command)?,
                    None => {
                        // The controlling side is gone; nothing left to
                        // serve this connection for.
                        warn!("command channel closed, ending session");
                        return Ok(KeepServing::No);
                    }
                }
            }
        }

        // Flush whatever the session queued during this round.
        while let Ok(frame) = outbound_rx.try_recv() {
            stream.write_all(&frame).await?;
        }
    }
}
