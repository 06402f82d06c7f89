//! LAN discovery
//!
//! The broadcaster advertises the control-channel TCP port to the companion
//! device once per interval: one datagram to the broadcast address and, when
//! configured, one to a unicast target. The listener is the companion side;
//! it accepts only advertisements that pass verification.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::wire::DiscoveryAdvertisement;
use crate::config::SyncConfig;
use crate::constants::protocol::{ADVERTISEMENT_SIZE, BROADCAST_INTERVAL_MS, DISCOVERY_PORT};
use crate::metrics::Metrics;

/// Errors raised by discovery endpoints
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Failed to open discovery socket: {0}")]
    Bind(#[source] std::io::Error),
    #[error("Failed to enable broadcast: {0}")]
    Broadcast(#[source] std::io::Error),
    #[error("Unicast target {0} is not IPv4; the discovery socket is IPv4 only")]
    UnsupportedTarget(IpAddr),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where and how often advertisements go
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Broadcast destination (address and UDP port)
    pub broadcast_addr: SocketAddr,
    /// Advertisement period
    pub interval: Duration,
    /// Unicast target used from the first send
    pub initial_target: Option<IpAddr>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            broadcast_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DISCOVERY_PORT),
            interval: Duration::from_millis(BROADCAST_INTERVAL_MS),
            initial_target: None,
        }
    }
}

impl From<&SyncConfig> for DiscoveryConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            broadcast_addr: SocketAddr::new(IpAddr::V4(config.broadcast_address), config.discovery_port),
            interval: config.broadcast_interval,
            initial_target: config.unicast_target,
        }
    }
}

/// Periodic advertisement sender
///
/// Owns its background task: `stop()` ends and joins it, dropping the
/// broadcaster aborts it.
pub struct DiscoveryBroadcaster {
    tcp_port: u16,
    config: DiscoveryConfig,
    /// Unicast destination, shared with the send task
    target: Arc<Mutex<Option<SocketAddr>>>,
    metrics: Option<Arc<Metrics>>,
    running: Option<RunningBroadcast>,
}

struct RunningBroadcast {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DiscoveryBroadcaster {
    pub fn new(tcp_port: u16, config: DiscoveryConfig) -> Self {
        let target = match config.initial_target {
            Some(ip @ IpAddr::V4(_)) => Some(SocketAddr::new(ip, config.broadcast_addr.port())),
            Some(ip) => {
                warn!("Ignoring discovery target {}: only IPv4 is supported", ip);
                None
            }
            None => None,
        };
        Self {
            tcp_port,
            config,
            target: Arc::new(Mutex::new(target)),
            metrics: None,
            running: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Opens the broadcast socket and spawns the send task
    ///
    /// Calling `start` on a running broadcaster is a no-op.
    pub async fn start(&mut self) -> Result<(), DiscoveryError> {
        if self.running.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0))
            .await
            .map_err(DiscoveryError::Bind)?;
        socket.set_broadcast(true).map_err(DiscoveryError::Broadcast)?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(broadcast_loop(
            socket,
            DiscoveryAdvertisement::new(self.tcp_port),
            self.config.broadcast_addr,
            self.config.interval,
            self.target.clone(),
            self.metrics.clone(),
            shutdown_rx,
        ));

        self.running = Some(RunningBroadcast { shutdown, task });
        info!(
            "Discovery started: advertising TCP port {} to {} every {:?}",
            self.tcp_port, self.config.broadcast_addr, self.config.interval
        );
        Ok(())
    }

    /// Signals the send task and waits for it; no-op when not running
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.task.await {
            if !e.is_cancelled() {
                warn!("Discovery task ended abnormally: {}", e);
            }
        }
        info!("Discovery stopped");
    }

    /// Sets or clears the unicast target; takes effect on the next send
    ///
    /// IPv6 targets are rejected and leave the current target unchanged.
    pub fn set_target_address(&self, address: Option<IpAddr>) -> Result<(), DiscoveryError> {
        if let Some(ip @ IpAddr::V6(_)) = address {
            warn!("Rejected discovery target {}: only IPv4 is supported", ip);
            return Err(DiscoveryError::UnsupportedTarget(ip));
        }
        self.store_target(address);
        Ok(())
    }

    fn store_target(&self, address: Option<IpAddr>) {
        let port = self.config.broadcast_addr.port();
        *self.target.lock() = address.map(|ip| SocketAddr::new(ip, port));
        match address {
            Some(ip) => info!("Discovery unicast target set to {}", ip),
            None => info!("Discovery unicast target cleared (broadcast only)"),
        }
    }

    /// Parses `address` as an IPv4 address; an empty, unparsable or IPv6
    /// string clears the target
    pub fn set_target(&self, address: &str) {
        let address = address.trim();
        if address.is_empty() {
            self.store_target(None);
            return;
        }
        match address.parse::<Ipv4Addr>() {
            Ok(ip) => self.store_target(Some(IpAddr::V4(ip))),
            Err(_) => {
                warn!("Invalid discovery target '{}', broadcasting only", address);
                self.store_target(None);
            }
        }
    }

    pub fn target_address(&self) -> Option<SocketAddr> {
        *self.target.lock()
    }
}

impl Drop for DiscoveryBroadcaster {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
            running.task.abort();
        }
    }
}

async fn broadcast_loop(
    socket: UdpSocket,
    advertisement: DiscoveryAdvertisement,
    broadcast_addr: SocketAddr,
    period: Duration,
    target: Arc<Mutex<Option<SocketAddr>>>,
    metrics: Option<Arc<Metrics>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let packet = advertisement.encode();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        send_advertisement(&socket, &packet, broadcast_addr, metrics.as_deref()).await;

        // Copy out so the lock is never held across a send
        let unicast = *target.lock();
        if let Some(addr) = unicast {
            send_advertisement(&socket, &packet, addr, metrics.as_deref()).await;
        }
    }

    debug!("Discovery send loop exited");
}

async fn send_advertisement(
    socket: &UdpSocket,
    packet: &[u8; ADVERTISEMENT_SIZE],
    addr: SocketAddr,
    metrics: Option<&Metrics>,
) {
    match socket.send_to(packet, addr).await {
        Ok(_) => {
            if let Some(metrics) = metrics {
                metrics.advertisements_sent.fetch_add(1, Ordering::Relaxed);
            }
        }
        Err(e) => debug!("Advertisement to {} failed: {}", addr, e),
    }
}

/// Companion-side receiver for advertisements
pub struct DiscoveryListener {
    socket: UdpSocket,
}

impl DiscoveryListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind(addr).await.map_err(DiscoveryError::Bind)?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DiscoveryError> {
        Ok(self.socket.local_addr()?)
    }

    /// Waits for the next valid advertisement
    ///
    /// Datagrams that fail verification are discarded silently.
    pub async fn recv_advertisement(&self) -> Result<(DiscoveryAdvertisement, SocketAddr), DiscoveryError> {
        let mut buf = [0u8; 64];
        loop {
            let (n, from) = self.socket.recv_from(&mut buf).await?;
            match DiscoveryAdvertisement::decode(&buf[..n]) {
                Ok(advertisement) => return Ok((advertisement, from)),
                Err(e) => debug!("Discarded datagram from {}: {}", from, e),
            }
        }
    }

    /// Control-channel endpoint advertised by the sender of a valid datagram
    pub async fn discover(&self) -> Result<SocketAddr, DiscoveryError> {
        let (advertisement, from) = self.recv_advertisement().await?;
        Ok(SocketAddr::new(from.ip(), advertisement.tcp_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    async fn loopback_listener() -> (DiscoveryListener, SocketAddr) {
        let listener = DiscoveryListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    fn fast_config(broadcast_addr: SocketAddr) -> DiscoveryConfig {
        DiscoveryConfig {
            broadcast_addr,
            interval: Duration::from_millis(20),
            initial_target: None,
        }
    }

    #[tokio::test]
    async fn test_broadcaster_advertises_port() {
        let (listener, addr) = loopback_listener().await;
        let mut broadcaster = DiscoveryBroadcaster::new(4242, fast_config(addr));
        broadcaster.start().await.unwrap();

        let (advertisement, _) = timeout(WAIT, listener.recv_advertisement()).await.unwrap().unwrap();
        assert_eq!(advertisement.tcp_port, 4242);

        broadcaster.stop().await;
        assert!(!broadcaster.is_running());
    }

    #[tokio::test]
    async fn test_discover_returns_sender_endpoint() {
        let (listener, addr) = loopback_listener().await;
        let mut broadcaster = DiscoveryBroadcaster::new(1191, fast_config(addr));
        broadcaster.start().await.unwrap();

        let endpoint = timeout(WAIT, listener.discover()).await.unwrap().unwrap();
        assert_eq!(endpoint.port(), 1191);
        assert!(endpoint.ip().is_loopback());
        broadcaster.stop().await;
    }

    #[tokio::test]
    async fn test_unicast_target_receives_copy() {
        let (listener, addr) = loopback_listener().await;
        let metrics = Arc::new(Metrics::new());
        let mut broadcaster = DiscoveryBroadcaster::new(7000, DiscoveryConfig {
            broadcast_addr: addr,
            interval: Duration::from_secs(60),
            initial_target: None,
        })
        .with_metrics(metrics.clone());

        // The unicast copy goes to the discovery port on the target host,
        // which on loopback is the same listener.
        broadcaster.set_target_address(Some(addr.ip())).unwrap();
        assert_eq!(broadcaster.target_address(), Some(addr));
        broadcaster.start().await.unwrap();

        for _ in 0..2 {
            let (advertisement, _) = timeout(WAIT, listener.recv_advertisement()).await.unwrap().unwrap();
            assert_eq!(advertisement.tcp_port, 7000);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(metrics.advertisements_sent.load(Ordering::Relaxed), 2);

        broadcaster.stop().await;
    }

    #[tokio::test]
    async fn test_target_parsing() {
        let broadcaster = DiscoveryBroadcaster::new(1191, DiscoveryConfig::default());
        broadcaster.set_target("192.168.1.20");
        assert_eq!(
            broadcaster.target_address(),
            Some("192.168.1.20:19191".parse().unwrap())
        );
        broadcaster.set_target("");
        assert_eq!(broadcaster.target_address(), None);
        broadcaster.set_target("not-an-ip");
        assert_eq!(broadcaster.target_address(), None);
        broadcaster.set_target("::1");
        assert_eq!(broadcaster.target_address(), None);
    }

    #[tokio::test]
    async fn test_ipv6_target_rejected() {
        let broadcaster = DiscoveryBroadcaster::new(1191, DiscoveryConfig::default());
        let v4: IpAddr = "10.0.0.5".parse().unwrap();
        broadcaster.set_target_address(Some(v4)).unwrap();

        let v6: IpAddr = "fe80::1".parse().unwrap();
        let err = broadcaster.set_target_address(Some(v6)).unwrap_err();
        assert!(matches!(err, DiscoveryError::UnsupportedTarget(ip) if ip == v6));
        assert_eq!(broadcaster.target_address(), Some(SocketAddr::new(v4, 19191)));

        let configured = DiscoveryBroadcaster::new(
            1191,
            DiscoveryConfig {
                initial_target: Some(v6),
                ..DiscoveryConfig::default()
            },
        );
        assert_eq!(configured.target_address(), None);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut broadcaster = DiscoveryBroadcaster::new(1191, DiscoveryConfig::default());
        timeout(WAIT, broadcaster.stop()).await.unwrap();

        let (_listener, addr) = loopback_listener().await;
        let mut broadcaster = DiscoveryBroadcaster::new(1191, fast_config(addr));
        broadcaster.start().await.unwrap();
        timeout(WAIT, broadcaster.stop()).await.unwrap();
        timeout(WAIT, broadcaster.stop()).await.unwrap();
    }

    #[tokio::test]
    async fn test_double_start_keeps_single_task() {
        let (listener, addr) = loopback_listener().await;
        let metrics = Arc::new(Metrics::new());
        let mut broadcaster = DiscoveryBroadcaster::new(1191, DiscoveryConfig {
            broadcast_addr: addr,
            interval: Duration::from_millis(200),
            initial_target: None,
        })
        .with_metrics(metrics.clone());

        broadcaster.start().await.unwrap();
        broadcaster.start().await.unwrap();
        assert!(broadcaster.is_running());

        // Interval's first tick is immediate; a second task would double the count
        timeout(WAIT, listener.recv_advertisement()).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(metrics.advertisements_sent.load(Ordering::Relaxed), 1);

        broadcaster.stop().await;
    }

    #[tokio::test]
    async fn test_listener_discards_invalid_datagrams() {
        let (listener, addr) = loopback_listener().await;
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut corrupted = DiscoveryAdvertisement::new(1000).encode();
        corrupted[9] ^= 0xFF;
        sender.send_to(&corrupted, addr).await.unwrap();
        sender.send_to(b"hello", addr).await.unwrap();
        sender.send_to(&DiscoveryAdvertisement::new(2000).encode(), addr).await.unwrap();

        let (advertisement, _) = timeout(WAIT, listener.recv_advertisement()).await.unwrap().unwrap();
        assert_eq!(advertisement.tcp_port, 2000);
    }
}
