//! NetworkController - one server session feeding reconfigurations

use std::fmt;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, error, info, instrument, trace, warn};

use contracts::ContractError;
use dataflow::DataflowHandle;

use crate::address::{ServerAddress, DEFAULT_PORT};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The I/O thread ended without being asked to
    Broken,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Broken => "broken",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection tuning
#[derive(Debug, Clone)]
pub struct NetworkOptions {
    /// Port used for addresses without one
    pub default_port: u16,

    /// Largest accepted inbound frame
    pub max_frame_length: usize,

    /// Per-address connect timeout
    pub connect_timeout: Duration,

    /// Longest time [`NetworkController::shutdown`] spends writing queued buffers
    pub flush_timeout: Duration,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            max_frame_length: 8 * 1024 * 1024,
            connect_timeout: Duration::from_secs(5),
            flush_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Clone)]
struct SharedState(Arc<Mutex<ConnectionState>>);

impl SharedState {
    fn get(&self) -> ConnectionState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: ConnectionState) {
        let mut current = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = *current;
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
            *current = state;
            observability::record_connection_state(state.as_str());
        }
    }
}

struct Session {
    address: ServerAddress,
    outbound: mpsc::UnboundedSender<Bytes>,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// Client side of the reconfiguration server
///
/// Every frame received is applied to the dataflow as an incremental document
/// inside a stop/start bracket. At most one session exists; connecting again
/// replaces it.
pub struct NetworkController {
    dataflow: DataflowHandle,
    options: NetworkOptions,
    state: SharedState,
    session: Mutex<Option<Session>>,
}

impl NetworkController {
    pub fn new(dataflow: DataflowHandle) -> Self {
        Self::with_options(dataflow, NetworkOptions::default())
    }

    pub fn with_options(dataflow: DataflowHandle, options: NetworkOptions) -> Self {
        Self {
            dataflow,
            options,
            state: SharedState(Arc::new(Mutex::new(ConnectionState::Disconnected))),
            session: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Address of the current session
    pub fn address(&self) -> Option<ServerAddress> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.address.clone())
    }

    /// Connect to `address` (`host[:port]`) and start the I/O thread
    ///
    /// Resolution and connection run on the caller's thread; every resolved
    /// address is tried in turn. On failure no thread is started. The session
    /// lock is not held meanwhile, so other callers see `NotConnected`.
    #[instrument(name = "network_connect", skip(self))]
    pub fn connect(&self, address: &str) -> Result<(), ContractError> {
        let address = ServerAddress::parse_with_default(address, self.options.default_port)?;
        let previous = self.session.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(previous) = previous {
            info!(address = %previous.address, "Replacing server session");
            self.close(previous);
        }

        self.state.set(ConnectionState::Connecting);
        let session = match self.open(&address).and_then(|stream| self.spawn_io(address, stream)) {
            Ok(session) => session,
            Err(e) => {
                self.state.set(ConnectionState::Disconnected);
                warn!(error = %e, "Connection failed");
                return Err(e);
            }
        };
        info!(address = %session.address, "Connected to server");

        let raced = self.session.lock().unwrap_or_else(PoisonError::into_inner).replace(session);
        if let Some(raced) = raced {
            debug!(address = %raced.address, "Dropping session opened concurrently");
            self.close(raced);
        }
        Ok(())
    }

    fn spawn_io(&self, address: ServerAddress, stream: TcpStream) -> Result<Session, ContractError> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = oneshot::channel();
        let io = IoLoop {
            dataflow: self.dataflow.clone(),
            state: self.state.clone(),
            max_frame_length: self.options.max_frame_length,
            flush_timeout: self.options.flush_timeout,
        };

        // Set before the thread exists so a quick failure is not overwritten
        self.state.set(ConnectionState::Connected);
        let thread = std::thread::Builder::new()
            .name("reconfig-io".to_string())
            .spawn(move || runtime.block_on(io.run(stream, outbound_rx, stop_rx)))?;

        Ok(Session {
            address,
            outbound,
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    fn open(&self, address: &ServerAddress) -> Result<TcpStream, ContractError> {
        let failed = |message: String| {
            ContractError::connection_failed(address.host(), address.port().to_string(), message)
        };
        let candidates: Vec<SocketAddr> = (address.host(), address.port())
            .to_socket_addrs()
            .map_err(|e| failed(e.to_string()))?
            .collect();

        let mut last_error = String::from("host resolved to no address");
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, self.options.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_nonblocking(true)?;
                    debug!(peer = %candidate, "TCP connection established");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(peer = %candidate, error = %e, "Connect attempt failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(failed(last_error))
    }

    /// Send a complete buffer to the server
    pub fn send(&self, bytes: impl Into<Bytes>) -> Result<(), ContractError> {
        let bytes = bytes.into();
        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = session.as_ref() else {
            return Err(ContractError::NotConnected);
        };
        if self.state.get() == ConnectionState::Broken {
            return Err(ContractError::NotConnected);
        }

        let len = bytes.len();
        if session.outbound.send(bytes).is_err() {
            self.state.set(ConnectionState::Broken);
            warn!(address = %session.address, "I/O thread gone, connection broken");
            return Err(ContractError::NotConnected);
        }
        observability::record_bytes_sent(len);
        trace!(bytes = len, "Queued for server");
        Ok(())
    }

    /// Send a UTF-8 document
    pub fn send_str(&self, document: &str) -> Result<(), ContractError> {
        self.send(Bytes::copy_from_slice(document.as_bytes()))
    }

    /// Send the contents of a file
    pub fn send_file(&self, path: impl AsRef<Path>) -> Result<(), ContractError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Sending file to server");
        let contents = std::fs::read(path)?;
        self.send(contents)
    }

    /// Stop the I/O thread and release the socket; idempotent
    ///
    /// Buffers already queued by [`Self::send`] are written first, for at
    /// most [`NetworkOptions::flush_timeout`].
    #[instrument(name = "network_shutdown", skip(self))]
    pub fn shutdown(&self) {
        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(session) = session {
            self.close(session);
        }
        self.state.set(ConnectionState::Disconnected);
    }

    fn close(&self, mut session: Session) {
        if let Some(stop) = session.stop.take() {
            let _ = stop.send(());
        }
        let Some(thread) = session.thread.take() else {
            return;
        };
        // The I/O thread waits on the control loop while a frame is applied
        if dataflow::on_control_thread() || thread.thread().id() == std::thread::current().id() {
            debug!("Shutdown requested from inside a reconfiguration, not joining");
            return;
        }
        if thread.join().is_err() {
            error!("Network I/O thread panicked");
        }
        debug!(address = %session.address, "Server session closed");
    }
}

impl Drop for NetworkController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for NetworkController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkController")
            .field("state", &self.state.get())
            .field("options", &self.options)
            .finish()
    }
}

struct IoLoop {
    dataflow: DataflowHandle,
    state: SharedState,
    max_frame_length: usize,
    flush_timeout: Duration,
}

impl IoLoop {
    async fn run(
        self,
        stream: TcpStream,
        mut outbound: mpsc::UnboundedReceiver<Bytes>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let stream = match tokio::net::TcpStream::from_std(stream) {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "Cannot register socket with runtime");
                self.state.set(ConnectionState::Broken);
                return;
            }
        };
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(self.max_frame_length)
            .new_codec();
        let (mut writer, mut reader) = Framed::new(stream, codec).split();
        debug!("Network I/O loop started");

        let broken = loop {
            tokio::select! {
                _ = &mut stop => break false,
                next = outbound.recv() => {
                    let Some(bytes) = next else { break false };
                    tokio::select! {
                        sent = writer.send(bytes) => if let Err(e) = sent {
                            warn!(error = %e, "Write to server failed");
                            break true;
                        },
                        _ = &mut stop => break false,
                    }
                }
                frame = reader.next() => match frame {
                    Some(Ok(frame)) => self.apply(frame.freeze()).await,
                    Some(Err(e)) => {
                        warn!(error = %e, "Read from server failed");
                        break true;
                    }
                    None => {
                        info!("Server closed the connection");
                        break true;
                    }
                },
            }
        };

        if broken {
            self.state.set(ConnectionState::Broken);
        } else {
            let drain = async {
                while let Ok(bytes) = outbound.try_recv() {
                    writer.feed(bytes).await?;
                }
                writer.flush().await
            };
            match tokio::time::timeout(self.flush_timeout, drain).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Write to server failed while closing"),
                Err(_) => warn!(
                    timeout_ms = self.flush_timeout.as_millis() as u64,
                    "Server not reading, queued buffers dropped"
                ),
            }
        }
        debug!(broken, "Network I/O loop stopped");
    }

    async fn apply(&self, frame: Bytes) {
        debug!(bytes = frame.len(), "Received document from server");
        let dataflow = self.dataflow.clone();
        match tokio::task::spawn_blocking(move || dataflow.reconfigure(frame)).await {
            Ok(Ok(())) => info!("Reconfiguration applied"),
            Ok(Err(e)) => warn!(error = %e, "Reconfiguration rejected"),
            Err(e) => error!(error = %e, "Reconfiguration task failed"),
        }
    }
}
