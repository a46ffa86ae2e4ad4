// Upstream connection to the switch.
//
// The game server is a client of the switch. `Upstream::run` owns the
// connection lifecycle and never returns on its own:
//
//     Disconnected -> Connecting -> Registered -> Streaming -> Disconnected
//
// - **Connecting**: open a TCP stream to the switch (bounded by a connect
//   timeout) and wrap its write half in a `BufWriter`. That writer is the
//   only one used for this connection.
// - **Registered**: `REGISTER<<name:key` has been written and flushed.
// - **Streaming**: three activities share the connection:
//   - the reader (this thread): blocking line reads, decoded into `Command`s
//     and pushed onto the dispatcher's inbound queue;
//   - the writer thread: drains the wire queue filled by the outbound
//     dispatcher and writes one flushed line per item;
//   - the heartbeat thread: queues `SERVER_PING<<null` every interval.
// - Any read error, framing error or write error clears the per-connection
//   `up` flag and shuts the socket down, which unblocks the reader and makes
//   the writer and heartbeat exit. The writer hands the `WireQueue` back when
//   it finishes, so queued lines survive into the next connection. A line
//   whose write failed is kept in the queue and goes out first next time.
//   After `reconnect_backoff` the loop starts over.
//
// `UpstreamLink` is the small piece of shared state other threads may look
// at: the current `ConnectionState` and a handle to the live socket so a
// server shutdown can interrupt a blocked read.

use std::io::{self, BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use gridwars_protocol::{Command, CommandType, Envelope, FramingError, read_command, write_line};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::outbound::POLL_INTERVAL;
use crate::timers::sleep_while;

/// Lower bound for a single connect attempt.
const MIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Where the upstream connection is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Registered,
    Streaming,
}

/// State shared between the upstream thread and the rest of the server.
#[derive(Debug)]
pub struct UpstreamLink {
    state: Mutex<ConnectionState>,
    socket: Mutex<Option<TcpStream>>,
}

impl UpstreamLink {
    fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            socket: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!(from = ?*current, to = ?state, "upstream state change");
            *current = state;
        }
    }

    /// Shut down the live socket, if any. Unblocks the reader.
    pub fn interrupt(&self) {
        if let Some(socket) = self.socket.lock().as_ref() {
            let _ = socket.shutdown(Shutdown::Both);
        }
    }
}

/// Lines waiting for the switch, plus the line whose write last failed.
pub(crate) struct WireQueue {
    rx: Receiver<String>,
    retry: Option<String>,
}

impl WireQueue {
    pub(crate) fn new(rx: Receiver<String>) -> Self {
        Self { rx, retry: None }
    }

    fn next(&mut self, timeout: Duration) -> Result<String, RecvTimeoutError> {
        match self.retry.take() {
            Some(line) => Ok(line),
            None => self.rx.recv_timeout(timeout),
        }
    }
}

/// Persistent, self-healing session to the switch.
pub struct Upstream {
    switch_addr: String,
    registration: String,
    heartbeat_interval: Duration,
    reconnect_backoff: Duration,
    inbound: Sender<Command>,
    wire_tx: Sender<String>,
    link: Arc<UpstreamLink>,
    keep_running: Arc<AtomicBool>,
}

impl Upstream {
    /// `inbound` feeds the dispatcher; `wire_tx` is the sending side of the
    /// wire queue (used for heartbeats).
    pub fn new(
        config: &ServerConfig,
        inbound: Sender<Command>,
        wire_tx: Sender<String>,
        keep_running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            switch_addr: config.switch_addr.clone(),
            registration: config.registration(),
            heartbeat_interval: config.heartbeat_interval(),
            reconnect_backoff: config.reconnect_backoff(),
            inbound,
            wire_tx,
            link: Arc::new(UpstreamLink::new()),
            keep_running,
        }
    }

    pub fn link(&self) -> Arc<UpstreamLink> {
        self.link.clone()
    }

    fn running(&self) -> bool {
        self.keep_running.load(Ordering::SeqCst)
    }

    /// Connection supervisor. Reconnects forever until `keep_running` is
    /// cleared.
    pub fn run(self, wire_rx: Receiver<String>) {
        let mut queue = WireQueue::new(wire_rx);
        while self.running() {
            self.link.set_state(ConnectionState::Connecting);
            info!(addr = %self.switch_addr, "connecting to switch");
            match self.connect() {
                Ok((stream, writer)) => {
                    self.link.set_state(ConnectionState::Registered);
                    info!(addr = %self.switch_addr, "registered with switch");
                    match self.stream(stream, writer, queue) {
                        Some(returned) => queue = returned,
                        None => {
                            error!("upstream writer died without returning the wire queue");
                            self.link.set_state(ConnectionState::Disconnected);
                            return;
                        }
                    }
                    warn!(
                        backoff_ms = self.reconnect_backoff.as_millis() as u64,
                        "disconnected from switch, retrying"
                    );
                }
                Err(e) => {
                    warn!(addr = %self.switch_addr, error = %e, "switch connection failed");
                }
            }
            self.link.set_state(ConnectionState::Disconnected);
            if !sleep_while(self.reconnect_backoff, || self.running()) {
                break;
            }
        }
        self.link.set_state(ConnectionState::Disconnected);
    }

    /// Open the socket and send the registration frame through the writer
    /// that will serve the whole connection.
    fn connect(&self) -> io::Result<(TcpStream, BufWriter<TcpStream>)> {
        let stream = self.open()?;
        stream.set_nodelay(true).ok();
        let mut writer = BufWriter::new(stream.try_clone()?);
        let register = Envelope::to_switch(Command::new(
            CommandType::Register,
            self.registration.clone(),
        ));
        write_line(&mut writer, &register.wire_line())?;
        Ok((stream, writer))
    }

    /// Try each resolved address in turn. An attempt never blocks longer
    /// than the reconnect backoff (and at least `MIN_CONNECT_TIMEOUT`).
    fn open(&self) -> io::Result<TcpStream> {
        let timeout = self.reconnect_backoff.max(MIN_CONNECT_TIMEOUT);
        let mut last_error = None;
        for addr in self.switch_addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} resolved to no addresses", self.switch_addr),
            )
        }))
    }

    /// Run one connection until it fails. Returns the wire queue for the
    /// next connection.
    fn stream(
        &self,
        stream: TcpStream,
        writer: BufWriter<TcpStream>,
        queue: WireQueue,
    ) -> Option<WireQueue> {
        let peer = stream.peer_addr().ok();
        let read_half = match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "could not clone switch socket");
                return Some(queue);
            }
        };
        *self.link.socket.lock() = Some(stream);

        let up = Arc::new(AtomicBool::new(true));

        let writer_thread = {
            let up = up.clone();
            let keep_running = self.keep_running.clone();
            thread::spawn(move || {
                let mut writer = writer;
                let mut queue = queue;
                write_loop(&mut writer, &mut queue, &up, &keep_running);
                // Unblock the reader if we are the side that noticed the
                // failure.
                let _ = writer.get_ref().shutdown(Shutdown::Both);
                queue
            })
        };

        let heartbeat_thread = {
            let up = up.clone();
            let keep_running = self.keep_running.clone();
            let wire_tx = self.wire_tx.clone();
            let interval = self.heartbeat_interval;
            thread::spawn(move || heartbeat_loop(&wire_tx, interval, &up, &keep_running))
        };

        self.link.set_state(ConnectionState::Streaming);
        self.read_loop(BufReader::new(read_half), peer, &up);

        // Tear everything down before reconnecting.
        up.store(false, Ordering::SeqCst);
        self.link.interrupt();
        *self.link.socket.lock() = None;
        let _ = heartbeat_thread.join();
        writer_thread.join().ok()
    }

    fn read_loop(&self, mut reader: BufReader<TcpStream>, peer: Option<SocketAddr>, up: &AtomicBool) {
        while up.load(Ordering::SeqCst) && self.running() {
            match read_command(&mut reader) {
                Ok(command) => {
                    let command = match peer {
                        Some(addr) => command.with_source(addr),
                        None => command,
                    };
                    if self.inbound.send(command).is_err() {
                        warn!("dispatcher is gone, dropping switch connection");
                        break;
                    }
                }
                Err(FramingError::Closed) => {
                    info!("switch closed the connection");
                    break;
                }
                Err(e @ FramingError::MissingSeparator { .. }) => {
                    warn!(error = %e, "corrupted frame from switch, dropping connection");
                    break;
                }
                Err(FramingError::Io(e)) => {
                    warn!(error = %e, "read from switch failed");
                    break;
                }
            }
        }
    }
}

/// Writer activity: one long-lived writer, one flushed line per queued item.
/// A line that fails to write stays in `queue` for the next connection.
/// Clears `up` on the way out.
fn write_loop<W: Write>(
    writer: &mut W,
    queue: &mut WireQueue,
    up: &AtomicBool,
    keep_running: &AtomicBool,
) {
    while up.load(Ordering::SeqCst) && keep_running.load(Ordering::SeqCst) {
        match queue.next(POLL_INTERVAL) {
            Ok(line) => {
                if let Err(e) = write_line(writer, &line) {
                    error!(error = %e, %line, "write to switch failed, line kept for retry");
                    queue.retry = Some(line);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    up.store(false, Ordering::SeqCst);
}

/// Heartbeat activity: queue a SERVER_PING every `interval` while the
/// connection is up.
fn heartbeat_loop(
    wire_tx: &Sender<String>,
    interval: Duration,
    up: &AtomicBool,
    keep_running: &AtomicBool,
) {
    let ping = Envelope::to_switch(Command::new(CommandType::ServerPing, "null")).wire_line();
    let alive = || up.load(Ordering::SeqCst) && keep_running.load(Ordering::SeqCst);
    while sleep_while(interval, &alive) {
        if wire_tx.send(ping.clone()).is_err() {
            break;
        }
    }
}
