//! MQTT Broker Core
//!
//! Accepts TCP connections and runs one handler task per connection. The
//! broker itself does no per-packet work; it owns the shared registry the
//! handlers route through.

mod connection;
mod registry;
mod router;
mod writer;

pub use connection::{Connection, ConnectionError};
pub use registry::{Matches, Registry};
pub use router::MessageRouter;
pub use writer::{SendError, SharedWriter};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch, Notify};
use tracing::{debug, error, info, warn};

use crate::codec::MAX_REMAINING_LENGTH;
use crate::protocol::QoS;

/// Broker-assigned identifier of one accepted connection.
///
/// Client identifiers are not required to be unique, so the registry is
/// keyed by this instead.
pub type ConnectionId = u64;

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// TCP bind address
    pub bind_addr: SocketAddr,
    /// Maximum remaining length accepted per packet
    pub max_packet_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 1883)),
            max_packet_size: MAX_REMAINING_LENGTH,
        }
    }
}

/// Broker events
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// Client connected
    ClientConnected { client_id: Arc<str>, addr: SocketAddr },
    /// Client disconnected
    ClientDisconnected { client_id: Arc<str> },
    /// Message published
    MessagePublished {
        topic: String,
        qos: QoS,
        /// Number of subscribers the frame was written to
        receivers: usize,
    },
}

/// Counts live handler tasks and wakes waiters when the count drops to zero
struct ActiveGuard {
    active: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>, idle: Arc<Notify>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self { active, idle }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// The MQTT Broker
pub struct Broker {
    /// Configuration
    config: BrokerConfig,
    /// Connection table and subscriptions
    registry: Arc<Registry>,
    router: Arc<MessageRouter>,
    next_id: AtomicU64,
    /// Shutdown signal for the accept loop
    shutdown: watch::Sender<bool>,
    /// Event channel
    events: broadcast::Sender<BrokerEvent>,
    /// Handler tasks still running
    active: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        let registry = Arc::new(Registry::new());
        let router = Arc::new(MessageRouter::new(registry.clone()));
        let (shutdown, _) = watch::channel(false);
        let (events, _) = broadcast::channel(1024);

        Self {
            config,
            registry,
            router,
            next_id: AtomicU64::new(1),
            shutdown,
            events,
            active: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Bind the configured address and serve until [`shutdown`](Self::shutdown)
    pub async fn run(&self) -> Result<(), std::io::Error> {
        let listener = bind_listener(self.config.bind_addr)?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), std::io::Error> {
        info!("MQTT/TCP listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("New TCP connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Failed to accept TCP connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.wait_for(|stopped| *stopped) => {
                    info!("Stopped accepting connections");
                    return Ok(());
                }
            }
        }
    }

    /// Handle a new connection
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = self.registry.clone();
        let router = self.router.clone();
        let events = self.events.clone();
        let max_packet_size = self.config.max_packet_size;
        let guard = ActiveGuard::new(self.active.clone(), self.idle.clone());

        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = stream.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
            }

            let mut conn =
                Connection::new(stream, addr, id, registry, router, events, max_packet_size);
            match conn.run().await {
                Ok(()) | Err(ConnectionError::Shutdown) => {}
                Err(ConnectionError::Io(e)) => {
                    debug!("Connection error from {}: {}", addr, e);
                }
                Err(e) => {
                    warn!("Closing connection from {}: {}", addr, e);
                }
            }
        });
    }

    /// Stop accepting new connections. Established connections keep running.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait until every connection handler has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a wakeup in between is not lost
            notified.as_mut().enable();
            if self.active.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Close every connection registered under `client_id`, returning how
    /// many were closed. Their handlers run the normal cleanup.
    pub async fn disconnect_client(&self, client_id: &str) -> usize {
        let writers = self.registry.find_by_client_id(client_id);
        for writer in &writers {
            writer.close().await;
        }
        if !writers.is_empty() {
            info!("Closed {} connection(s) for client {}", writers.len(), client_id);
        }
        writers.len()
    }

    /// Subscribe to broker events
    pub fn subscribe_events(&self) -> broadcast::Receiver<BrokerEvent> {
        self.events.subscribe()
    }

    /// Registered (post-CONNECT) connections
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Total (filter, connection) subscriptions
    pub fn subscription_count(&self) -> usize {
        self.registry.subscription_count()
    }

    /// Handler tasks still running, including ones not yet past CONNECT
    pub fn active_handlers(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// Bind a non-blocking listener with SO_REUSEADDR set
fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}
