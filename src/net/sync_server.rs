//! Boundary sync server
//!
//! Listens on the control channel, advertises it over discovery and serves
//! one peer at a time. Each whole record read from the peer is decoded and
//! handed to the [`FrameProcessor`] in arrival order. A peer closing the
//! connection sends the server back to listening; only `shutdown()` ends it.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::discovery::{DiscoveryBroadcaster, DiscoveryConfig, DiscoveryError};
use super::frame_processor::FrameProcessor;
use super::framing::{read_record, FramingError};
use super::wire::BoundaryWireFrame;
use crate::chaperone::{BoundaryDistanceEngine, BoundaryNotifier};
use crate::config::SyncConfig;
use crate::constants::protocol::BOUNDARY_FRAME_SIZE;
use crate::metrics::Metrics;
use crate::tracking::SharedRuntime;

/// Pending connections beyond the one being served
const LISTEN_BACKLOG: u32 = 1;

/// Pause after a failed accept before trying again
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Discovery failed to start: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("Server has been shut down")]
    ShutDown,
}

/// Lifecycle of the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServerState {
    Idle,
    Listening,
    Connected,
    Shutdown,
}

pub struct BoundarySyncServer {
    config: SyncConfig,
    metrics: Arc<Metrics>,
    broadcaster: Option<DiscoveryBroadcaster>,
    /// Moved into the accept task by `initialize`
    processor: Option<FrameProcessor>,
    state_tx: Option<watch::Sender<ServerState>>,
    state: watch::Receiver<ServerState>,
    shutdown_tx: watch::Sender<bool>,
    local_addr: Option<SocketAddr>,
    task: Option<JoinHandle<()>>,
}

impl BoundarySyncServer {
    pub fn new(
        config: SyncConfig,
        runtime: SharedRuntime,
        engine: Arc<BoundaryDistanceEngine>,
        notifier: BoundaryNotifier,
        metrics: Arc<Metrics>,
    ) -> Self {
        let processor = FrameProcessor::new(runtime, engine, notifier, metrics.clone())
            .with_wall_height(config.wall_height)
            .with_recommit_threshold(config.recommit_threshold);
        let (state_tx, state) = watch::channel(ServerState::Idle);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            metrics,
            broadcaster: None,
            processor: Some(processor),
            state_tx: Some(state_tx),
            state,
            shutdown_tx,
            local_addr: None,
            task: None,
        }
    }

    /// Binds the control channel, starts discovery for the bound port and
    /// spawns the accept loop
    ///
    /// Errors are returned as-is with no retry. Calling `initialize` again
    /// while listening is a no-op.
    pub async fn initialize(&mut self) -> Result<(), SyncError> {
        match self.state() {
            ServerState::Idle => {}
            ServerState::Shutdown => return Err(SyncError::ShutDown),
            ServerState::Listening | ServerState::Connected => return Ok(()),
        }
        let (Some(processor), Some(state_tx)) = (self.processor.take(), self.state_tx.take()) else {
            return Err(SyncError::ShutDown);
        };

        let addr = SocketAddr::new(self.config.bind_address, self.config.tcp_port);
        let (listener, local_addr) = match bind_listener(addr) {
            Ok(bound) => bound,
            Err(source) => {
                self.processor = Some(processor);
                self.state_tx = Some(state_tx);
                return Err(SyncError::Listen { addr, source });
            }
        };

        let mut broadcaster = DiscoveryBroadcaster::new(local_addr.port(), DiscoveryConfig::from(&self.config))
            .with_metrics(self.metrics.clone());
        if let Err(e) = broadcaster.start().await {
            self.processor = Some(processor);
            self.state_tx = Some(state_tx);
            return Err(e.into());
        }

        let _ = state_tx.send(ServerState::Listening);
        self.task = Some(tokio::spawn(accept_loop(
            listener,
            processor,
            state_tx,
            self.metrics.clone(),
            self.shutdown_tx.subscribe(),
        )));
        self.broadcaster = Some(broadcaster);
        self.local_addr = Some(local_addr);

        info!("Waiting for boundary peer on {}", local_addr);
        Ok(())
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Resolves once the server reaches `target`; false if it never can
    pub async fn wait_for_state(&self, target: ServerState) -> bool {
        let mut state = self.state.clone();
        let reached = state.wait_for(|s| *s == target).await.is_ok();
        reached
    }

    /// Bound control channel endpoint, once initialized
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Sets or clears the discovery unicast target
    ///
    /// Before `initialize` the target is kept for when discovery starts.
    pub fn set_discovery_target(&mut self, address: Option<IpAddr>) -> Result<(), DiscoveryError> {
        if let Some(ip @ IpAddr::V6(_)) = address {
            return Err(DiscoveryError::UnsupportedTarget(ip));
        }
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.set_target_address(address)?;
        }
        self.config.unicast_target = address;
        Ok(())
    }

    pub fn discovery_target(&self) -> Option<IpAddr> {
        self.config.unicast_target
    }

    /// Closes the listener and any active connection, stops discovery
    ///
    /// Terminal; later calls are no-ops.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Sync server task ended abnormally: {}", e);
                }
            }
        }
        if let Some(mut broadcaster) = self.broadcaster.take() {
            broadcaster.stop().await;
        }
        // Never initialized: the sender is still ours
        if let Some(state_tx) = self.state_tx.take() {
            let _ = state_tx.send(ServerState::Shutdown);
        }
        self.processor = None;

        if self.local_addr.is_some() {
            info!("Sync server shut down");
        }
    }
}

impl Drop for BoundarySyncServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn bind_listener(addr: SocketAddr) -> std::io::Result<(TcpListener, SocketAddr)> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(LISTEN_BACKLOG)?;
    let local_addr = listener.local_addr()?;
    Ok((listener, local_addr))
}

async fn accept_loop(
    listener: TcpListener,
    mut processor: FrameProcessor,
    state: watch::Sender<ServerState>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        let _ = state.send(ServerState::Listening);

        let accepted = tokio::select! {
            res = listener.accept() => res,
            _ = shutdown.changed() => break,
        };
        let (stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Accept failed: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }
        metrics.connections_accepted.fetch_add(1, Ordering::Relaxed);
        let _ = state.send(ServerState::Connected);
        metrics.connections_active.fetch_add(1, Ordering::Relaxed);
        info!("Boundary peer connected from {}", peer);

        let stopped = serve_connection(stream, peer, &mut processor, &metrics, &mut shutdown).await;
        metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
        if stopped {
            break;
        }
    }

    let _ = state.send(ServerState::Shutdown);
    debug!("Sync accept loop exited");
}

/// Reads records until the peer leaves; true when shutdown was requested
async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    processor: &mut FrameProcessor,
    metrics: &Metrics,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        let record = tokio::select! {
            res = read_record::<_, BOUNDARY_FRAME_SIZE>(&mut stream) => res,
            _ = shutdown.changed() => return true,
        };

        match record {
            Ok(bytes) => match BoundaryWireFrame::decode(&bytes) {
                Ok(frame) => {
                    let outcome = processor.process_frame(&frame);
                    debug!("Frame from {}: {:?}", peer, outcome);
                }
                Err(e) => {
                    metrics.frames_malformed.fetch_add(1, Ordering::Relaxed);
                    debug!("Discarded record from {}: {}", peer, e);
                }
            },
            Err(FramingError::ConnectionClosed) => {
                info!("Boundary peer {} disconnected", peer);
                return false;
            }
            Err(FramingError::Io(e)) => {
                info!("Boundary peer {} disconnected: {}", peer, e);
                return false;
            }
        }
    }
}
