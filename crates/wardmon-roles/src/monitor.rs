//! Monitor role: the connection multiplexer
//!
//! The monitor listens for tester connections and serves three record
//! types per peer: `NAME` tags the connection, `CONFIG_REQUEST` is
//! answered with the prepared config frame, and `STATS_UPDATE` replaces
//! the peer's statistics snapshot. Each accepted peer runs in its own
//! task over the framed codec, so records on one connection are handled
//! strictly in arrival order and every config request is answered
//! exactly once; between peers no ordering is promised. Protocol errors
//! are logged and the peer kept; only a closed or failed socket removes
//! it.

use crate::codec::{Command, LineCodec};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::interval;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};
use wardmon_core::{Config, Error, Result};

/// Default listen port
pub const DEFAULT_PORT: u16 = 5000;
/// Cadence of the liveness tick summarising connected peers
pub const LIVENESS_TICK: Duration = Duration::from_secs(15);

/// Per-peer connection state
#[derive(Debug, Default, Clone)]
pub struct PeerState {
    pub name: Option<String>,
    pub stats: Option<Value>,
}

/// Shared registry of connected testers and their latest snapshots
#[derive(Debug, Default, Clone)]
pub struct Registry {
    peers: Arc<RwLock<HashMap<SocketAddr, PeerState>>>,
}

impl Registry {
    fn insert(&self, addr: SocketAddr) {
        self.peers.write().insert(addr, PeerState::default());
    }

    fn remove(&self, addr: SocketAddr) {
        self.peers.write().remove(&addr);
    }

    fn set_name(&self, addr: SocketAddr, name: String) {
        if let Some(peer) = self.peers.write().get_mut(&addr) {
            peer.name = Some(name);
        }
    }

    fn set_stats(&self, addr: SocketAddr, stats: Value) {
        if let Some(peer) = self.peers.write().get_mut(&addr) {
            peer.stats = Some(stats);
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Latest snapshot per tester, keyed by reported name or address
    pub fn aggregated(&self) -> HashMap<String, Value> {
        self.peers
            .read()
            .iter()
            .filter_map(|(addr, peer)| {
                let key = peer.name.clone().unwrap_or_else(|| addr.to_string());
                peer.stats.clone().map(|stats| (key, stats))
            })
            .collect()
    }
}

/// The monitor server: listener, prepared config frame, and peer registry
pub struct Monitor {
    listener: TcpListener,
    config_frame: String,
    registry: Registry,
}

impl Monitor {
    /// Bind the listen socket and prepare the config frame
    ///
    /// Listens on `general.ip` (all interfaces when unset) and
    /// `general.port` (5000 when unset). The frame shipped to testers is
    /// the configuration minus its `general` section, so testers never
    /// re-read role or endpoint settings.
    pub async fn bind(config: &Config) -> Result<Self> {
        let ip = match config.general("ip") {
            Some(ip) if !ip.is_empty() => ip.to_string(),
            _ => {
                info!("no listen ip configured, listening on all interfaces");
                "0.0.0.0".to_string()
            }
        };
        let port = match config.general("port") {
            Some(port) => port.parse().map_err(|_| {
                Error::Config(format!("invalid listen port {:?}", port))
            })?,
            None => {
                info!("no listen port configured, using {}", DEFAULT_PORT);
                DEFAULT_PORT
            }
        };

        let listener = TcpListener::bind((ip.as_str(), port)).await?;
        info!("monitor listening on {}", listener.local_addr()?);

        let config_frame = serde_json::to_string(&config.without_general())?;
        Ok(Self {
            listener,
            config_frame,
            registry: Registry::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the peer registry, usable while the server runs
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Accept testers until the process is stopped
    pub async fn run(self) -> Result<()> {
        let mut ticks = interval(LIVENESS_TICK);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("accepted tester connection from {}", addr);
                        self.registry.insert(addr);
                        tokio::spawn(serve_peer(
                            stream,
                            addr,
                            self.config_frame.clone(),
                            self.registry.clone(),
                        ));
                    }
                    Err(e) => warn!("accept failed: {}", e),
                },
                _ = ticks.tick() => {
                    let aggregated = self.registry.aggregated();
                    info!(
                        "{} testers connected, {} reporting",
                        self.registry.peer_count(),
                        aggregated.len()
                    );
                    for (name, stats) in &aggregated {
                        debug!("latest from {}: {}", name, stats);
                    }
                }
            }
        }
    }
}

/// Serve one tester connection until it closes
async fn serve_peer(stream: TcpStream, addr: SocketAddr, config_frame: String, registry: Registry) {
    let mut link = Framed::new(stream, LineCodec::new());

    while let Some(record) = link.next().await {
        let line = match record {
            Ok(line) => line,
            Err(e) => {
                warn!("reading from {} failed: {}", addr, e);
                break;
            }
        };
        match Command::parse(&line) {
            Ok(Command::Name(name)) => {
                debug!("peer {} is {}", addr, name);
                registry.set_name(addr, name);
            }
            Ok(Command::ConfigRequest) => {
                if let Err(e) = link.send(config_frame.clone()).await {
                    warn!("sending config to {} failed: {}", addr, e);
                    break;
                }
            }
            Ok(Command::StatsUpdate(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(stats) => {
                    debug!("stats from {}: {}", addr, stats);
                    registry.set_stats(addr, stats);
                }
                Err(e) => warn!("bad stats payload from {}: {}, discarded", addr, e),
            },
            Err(e) => warn!("{} from {}, record discarded", e, addr),
        }
    }

    registry.remove(addr);
    info!("connection with {} closed", addr);
}
