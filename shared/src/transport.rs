//! Socket ownership and the reactor thread
//!
//! Each endpoint (one client or one server) owns a single UDP socket. The
//! socket is driven by a current-thread tokio runtime on its own OS thread,
//! which runs the [`Listener`] receive loop next to an outbound writer. Game
//! code never touches the socket: [`Sender`](crate::sender::Sender)s push
//! finished datagrams onto an [`OutboundQueue`] and the writer sends them in
//! order.

use crate::error::SendError;
use crate::listener::Listener;
use log::{debug, error, warn};
use std::io;
use std::net::SocketAddr;
use std::thread::{self, JoinHandle};
use tokio::net::UdpSocket;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{mpsc, oneshot};

/// One framed packet and its destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub bytes: Vec<u8>,
    pub remote: SocketAddr,
}

/// Producer half of the outbound datagram channel
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<Datagram>,
}

impl OutboundQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Datagram>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn push(&self, datagram: Datagram) -> Result<(), SendError> {
        self.tx.send(datagram).map_err(|_| SendError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A bound socket waiting for its reactor
pub struct Endpoint {
    socket: std::net::UdpSocket,
}

impl Endpoint {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = std::net::UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

/// Handle to a running reactor thread. Dropping it shuts the thread down.
pub struct Reactor {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Reactor {
    /// Spawns the reactor thread and waits until its runtime owns the socket
    pub fn start(
        endpoint: Endpoint,
        mut listener: Listener,
        mut outbound: mpsc::UnboundedReceiver<Datagram>,
        name: &str,
    ) -> io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<io::Result<()>>();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let (runtime, socket) = match enter_runtime(endpoint) {
                    Ok(started) => started,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                runtime.block_on(async move {
                    tokio::select! {
                        _ = listener.run(&socket) => {
                            debug!("Listener stopped, reactor exiting");
                        }
                        _ = write_loop(&socket, &mut outbound) => {
                            debug!("All senders dropped, reactor exiting");
                        }
                        _ = shutdown_rx => {
                            debug!("Reactor shutdown requested");
                        }
                    }

                    // Goodbyes queued right before shutdown still go out
                    while let Ok(datagram) = outbound.try_recv() {
                        send_datagram(&socket, &datagram).await;
                    }
                });
            })?;

        let started = ready_rx.recv().unwrap_or_else(|_| {
            Err(io::Error::new(
                io::ErrorKind::Other,
                "reactor thread exited during startup",
            ))
        });
        if let Err(e) = started {
            let _ = thread.join();
            return Err(e);
        }

        Ok(Self {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the reactor and joins its thread. After this returns no handler
    /// callback can run. Calling it twice is harmless.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            // Err means the reactor already exited on its own
            let _ = tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Reactor thread panicked");
            }
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn enter_runtime(endpoint: Endpoint) -> io::Result<(Runtime, UdpSocket)> {
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let socket = {
        let _guard = runtime.enter();
        UdpSocket::from_std(endpoint.socket)?
    };
    Ok((runtime, socket))
}

async fn write_loop(socket: &UdpSocket, outbound: &mut mpsc::UnboundedReceiver<Datagram>) {
    while let Some(datagram) = outbound.recv().await {
        send_datagram(socket, &datagram).await;
    }
}

async fn send_datagram(socket: &UdpSocket, datagram: &Datagram) {
    match socket.send_to(&datagram.bytes, datagram.remote).await {
        Ok(size) if size == datagram.bytes.len() => {
            debug!("Sent {} bytes to {}", size, datagram.remote);
        }
        Ok(size) => {
            warn!(
                "Short send to {}: {} of {} bytes",
                datagram.remote,
                size,
                datagram.bytes.len()
            );
        }
        Err(e) => {
            error!("Failed to send to {}: {}", datagram.remote, e);
        }
    }
}
