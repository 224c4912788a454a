//! TCP front end: one thread per connection, newline-delimited JSON frames.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::metrics::ServerMetrics;
use crate::session::{Inbound, Session, SessionSettings, Transport, TransportError};
use crate::shared::SharedWorld;

/// Longest accepted inbound frame, newline included.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Line-framed transport over a TCP stream.
///
/// A reader thread forwards complete lines into a channel so receives can be
/// bounded with `recv_timeout`.
pub struct LineTransport {
    writer: TcpStream,
    inbound: Receiver<io::Result<String>>,
    peer: SocketAddr,
}

impl LineTransport {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        let reader = stream.try_clone()?;
        let (sender, inbound) = unbounded();
        thread::Builder::new()
            .name(format!("life-read-{peer}"))
            .spawn(move || {
                let mut reader = BufReader::new(reader);
                let mut line = String::new();
                loop {
                    line.clear();
                    let limit = MAX_FRAME_BYTES as u64 + 1;
                    match reader.by_ref().take(limit).read_line(&mut line) {
                        Ok(0) => break,
                        Ok(read) if read > MAX_FRAME_BYTES => {
                            let _ = sender.send(Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                format!("frame exceeds {MAX_FRAME_BYTES} bytes"),
                            )));
                            break;
                        }
                        Ok(_) => {
                            let trimmed = line.trim();
                            if trimmed.is_empty() {
                                continue;
                            }
                            if sender.send(Ok(trimmed.to_string())).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            let _ = sender.send(Err(err));
                            break;
                        }
                    }
                }
            })?;
        Ok(Self {
            writer: stream,
            inbound,
            peer,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

fn classify(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => TransportError::Disconnected,
        _ => TransportError::Io(err),
    }
}

impl Transport for LineTransport {
    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let mut buffer = Vec::with_capacity(frame.len() + 1);
        buffer.extend_from_slice(frame.as_bytes());
        buffer.push(b'\n');
        self.writer.write_all(&buffer).map_err(classify)
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Inbound, TransportError> {
        match self.inbound.recv_timeout(timeout) {
            Ok(Ok(line)) => Ok(Inbound::Message(line)),
            Ok(Err(err)) => Err(classify(err)),
            Err(RecvTimeoutError::Timeout) => Ok(Inbound::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.writer.shutdown(Shutdown::Both) {
            Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(TransportError::Io(err)),
            _ => Ok(()),
        }
    }
}

impl Drop for LineTransport {
    fn drop(&mut self) {
        // Unblocks the reader thread.
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}

/// Accepts connections and runs a [`Session`] for each on its own thread.
pub struct LifeServer {
    listener: TcpListener,
    world: SharedWorld,
    settings: Arc<SessionSettings>,
    metrics: Arc<ServerMetrics>,
}

impl LifeServer {
    pub fn bind(
        addr: SocketAddr,
        world: SharedWorld,
        settings: SessionSettings,
        metrics: Arc<ServerMetrics>,
    ) -> io::Result<Self> {
        let bounds = settings.bounds;
        if (bounds.rows as usize, bounds.cols as usize) != (world.height(), world.width()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "session bounds {}x{} do not match world {}x{}",
                    bounds.rows,
                    bounds.cols,
                    world.height(),
                    world.width()
                ),
            ));
        }
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            world,
            settings: Arc::new(settings),
            metrics,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever.
    pub fn serve(self) -> io::Result<()> {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let world = self.world.clone();
                    let settings = Arc::clone(&self.settings);
                    let metrics = Arc::clone(&self.metrics);
                    let spawned = thread::Builder::new()
                        .name("life-session".to_string())
                        .spawn(move || handle_connection(stream, world, settings, metrics));
                    if let Err(err) = spawned {
                        warn!(target: "life_sim::network", error = %err, "session.spawn_failed");
                    }
                }
                Err(err) => {
                    warn!(target: "life_sim::network", error = %err, "accept.failed");
                    thread::sleep(Duration::from_millis(200));
                }
            }
        }
        Ok(())
    }

    /// Run [`LifeServer::serve`] on a background thread.
    pub fn spawn(self) -> io::Result<JoinHandle<io::Result<()>>> {
        thread::Builder::new()
            .name("life-accept".to_string())
            .spawn(move || self.serve())
    }
}

fn handle_connection(
    stream: TcpStream,
    world: SharedWorld,
    settings: Arc<SessionSettings>,
    metrics: Arc<ServerMetrics>,
) {
    if let Err(err) = stream.set_nodelay(true) {
        warn!(target: "life_sim::network", error = %err, "Failed to set TCP_NODELAY");
    }
    let transport = match LineTransport::new(stream) {
        Ok(transport) => transport,
        Err(err) => {
            warn!(target: "life_sim::network", error = %err, "connection.setup_failed");
            return;
        }
    };
    let peer = transport.peer();

    metrics.connection_opened();
    info!(target: "life_sim::network", %peer, "connection.opened");

    match Session::new(transport, world, settings, Arc::clone(&metrics)).run() {
        Ok(()) => debug!(target: "life_sim::network", %peer, "connection.closed=clean"),
        Err(err) => warn!(target: "life_sim::network", %peer, error = %err, "connection.closed=error"),
    }

    metrics.connection_closed();
    let snapshot = metrics.snapshot();
    info!(
        target: "life_sim::network",
        %peer,
        active = snapshot.active_connections(),
        steps = snapshot.steps,
        cells_stepped = snapshot.cells_stepped,
        protocol_errors = snapshot.protocol_errors,
        "connection.summary"
    );
}
