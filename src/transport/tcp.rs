use bytes::{Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    runtime::Handle,
    select,
    sync::{mpsc, oneshot, watch},
};
use tracing::debug;

use super::{SendCompletion, Task, TransportContext};
use crate::config::TransportConfig;
use crate::session::{Session, SessionId};

// -----------------------------------------------------------------------------
// ----- TcpTransport ----------------------------------------------------------

/// `TransportContext` over a tokio `TcpStream`.
///
/// Sends go through a single writer task, so they hit the socket in the order
/// they were queued. Closing is signalled to both the reader and the writer
/// through one watch channel.
#[derive(Debug)]
pub struct TcpTransport {
    runtime: Handle,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
    commands: mpsc::UnboundedSender<WriterCommand>,
    shutdown: Arc<watch::Sender<bool>>,
}

#[derive(Debug)]
enum WriterCommand {
    Send {
        buf: Bytes,
        done: oneshot::Sender<io::Result<()>>,
    },
    Close,
}

// -----------------------------------------------------------------------------
// ----- TcpTransport: TransportContext ----------------------------------------

impl TransportContext for TcpTransport {
    fn execute(&self, task: Task) {
        self.runtime.spawn(task);
    }

    fn schedule(&self, task: Task, delay: Duration) {
        let mut closed = self.shutdown.subscribe();

        self.runtime.spawn(async move {
            select! {
                _ = tokio::time::sleep(delay) => task.await,
                _ = shutdown_requested(&mut closed) => {}
            }
        });
    }

    fn send(&self, buf: Bytes) -> SendCompletion {
        let (done, completion) = oneshot::channel();

        // If the writer is gone the command is dropped with `done` inside it,
        // which the caller sees as a closed completion.
        let _ = self.commands.send(WriterCommand::Send { buf, done });

        completion
    }

    fn flush_and_close(&self) {
        if self.commands.send(WriterCommand::Close).is_err() {
            self.shutdown.send_replace(true);
        }
    }

    fn close(&self) {
        self.shutdown.send_replace(true);
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

// -----------------------------------------------------------------------------
// ----- Serve -----------------------------------------------------------------

/// Drive `session` over `stream` until the connection closes.
///
/// Activates the session, feeds it inbound chunks, and tears it down when the
/// peer hangs up, a read fails, or a close is requested.
pub async fn serve(session: Arc<Session>, stream: TcpStream, config: &TransportConfig) {
    if let Err(e) = stream.set_nodelay(config.nodelay) {
        debug!(session_id = %session.id(), "set_nodelay failed: {e}");
    }

    let local_addr = stream.local_addr().ok();
    let remote_addr = stream.peer_addr().ok();
    let (reader, writer) = stream.into_split();

    let (commands, rx) = mpsc::unbounded_channel();
    let (shutdown, closed) = watch::channel(false);
    let shutdown = Arc::new(shutdown);
    let runtime = Handle::current();

    spawn_writer_task(&runtime, session.id(), writer, rx, shutdown.clone());

    let transport = Arc::new(TcpTransport {
        runtime,
        local_addr,
        remote_addr,
        commands,
        shutdown,
    });

    session.on_connection_active(transport.clone());

    read_loop(&session, reader, closed, config.read_buffer_capacity).await;

    // Stops the writer if the peer went away first.
    transport.close();
    session.on_connection_inactive();
}

// -----------------------------------------------------------------------------
// ----- Internal: Reader ------------------------------------------------------

async fn read_loop(
    session: &Arc<Session>,
    mut reader: OwnedReadHalf,
    mut closed: watch::Receiver<bool>,
    capacity: usize,
) {
    let mut inbox = BytesMut::with_capacity(capacity);

    loop {
        inbox.reserve(capacity);

        select! {
            read_res = reader.read_buf(&mut inbox) => {
                match read_res {
                    Ok(0) => {
                        debug!(session_id = %session.id(), "peer closed connection");
                        break;
                    }
                    Ok(_) => match session.on_data_received(&mut inbox) {
                        Ok(()) => {}
                        Err(e) if e.is_not_connected() => break,
                        Err(e) => {
                            session.on_transport_error(&e);
                            break;
                        }
                    },
                    Err(e) => {
                        session.on_transport_error(&e);
                        break;
                    }
                }
            }

            _ = shutdown_requested(&mut closed) => break,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Writer ------------------------------------------------------

fn spawn_writer_task(
    runtime: &Handle,
    session_id: SessionId,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    shutdown: Arc<watch::Sender<bool>>,
) {
    let mut closed = shutdown.subscribe();

    runtime.spawn(async move {
        loop {
            let command = select! {
                command = rx.recv() => command,
                _ = shutdown_requested(&mut closed) => None,
            };

            let Some(command) = command else {
                break;
            };

            match command {
                WriterCommand::Send { buf, done } => {
                    // A peer that stops reading must not pin the writer past close-now.
                    let res = select! {
                        res = write_buf(&mut writer, &buf) => res,
                        _ = shutdown_requested(&mut closed) => {
                            let _ = done.send(Err(io::Error::new(
                                io::ErrorKind::ConnectionAborted,
                                "connection closed while writing",
                            )));
                            break;
                        }
                    };
                    if let Err(e) = &res {
                        debug!(session_id = %session_id, "socket write failed: {e}");
                    }
                    let _ = done.send(res);
                }

                WriterCommand::Close => {
                    select! {
                        res = writer.shutdown() => {
                            if let Err(e) = res {
                                debug!(session_id = %session_id, "socket shutdown failed: {e}");
                            }
                        }
                        _ = shutdown_requested(&mut closed) => {}
                    }
                    shutdown.send_replace(true);
                    break;
                }
            }
        }

        debug!(session_id = %session_id, "writer stopped");
    });
}

async fn write_buf(writer: &mut OwnedWriteHalf, buf: &Bytes) -> io::Result<()> {
    if buf.is_empty() {
        writer.flush().await
    } else {
        writer.write_all(buf).await
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

async fn shutdown_requested(closed: &mut watch::Receiver<bool>) {
    // Err means every sender is gone, which is a shutdown too.
    let _ = closed.wait_for(|closed| *closed).await;
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
