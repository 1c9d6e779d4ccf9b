//! NetworkSink - UDP fire-and-forget streaming

use bytes::Bytes;
use contracts::{ContractError, NotificationSink};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::UdpSocket;
use tracing::{debug, error, instrument, warn};

use crate::error::DispatcherError;

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Target address
    pub addr: SocketAddr,
    /// Max datagram size (UDP typically 65507 for IPv4)
    pub max_packet_size: usize,
}

impl NetworkSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{addr_str}': {e}"))?;

        let max_packet_size = match params.get("max_packet_size") {
            Some(s) => s
                .parse()
                .map_err(|e| format!("invalid max_packet_size '{s}': {e}"))?,
            None => 65000,
        };

        Ok(Self {
            addr,
            max_packet_size,
        })
    }
}

/// Sink that sends each payload as one UDP datagram
///
/// Datagrams larger than `max_packet_size` are dropped. A send error other
/// than a full socket buffer marks the sink unwritable.
pub struct NetworkSink {
    id: String,
    config: NetworkSinkConfig,
    socket: UdpSocket,
    writable: AtomicBool,
}

impl NetworkSink {
    /// Create a new NetworkSink
    #[instrument(name = "network_sink_new", skip(id, config), fields(target = %config.addr))]
    pub async fn new(id: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let id = id.into();
        let bind: SocketAddr = if config.addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(&config.addr).await?;

        debug!(sink = %id, target = %config.addr, "NetworkSink connected");

        Ok(Self {
            id,
            config,
            socket,
            writable: AtomicBool::new(true),
        })
    }

    /// Create from params (for factory)
    pub async fn from_params(
        id: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, DispatcherError> {
        let id = id.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| DispatcherError::sink_creation(&id, e))?;

        Self::new(id.clone(), config)
            .await
            .map_err(|e| DispatcherError::sink_creation(id, e.to_string()))
    }

    /// Target address
    pub fn addr(&self) -> SocketAddr {
        self.config.addr
    }
}

impl NotificationSink for NetworkSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::Acquire)
    }

    fn write(&self, payload: Bytes) -> Result<(), ContractError> {
        if payload.len() > self.config.max_packet_size {
            warn!(
                sink = %self.id,
                size = payload.len(),
                max = self.config.max_packet_size,
                "Payload too large, datagram dropped"
            );
            return Ok(());
        }

        match self.socket.try_send(&payload) {
            Ok(sent) => {
                debug!(sink = %self.id, bytes = sent, "Sent");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                // UDP is best-effort
                warn!(sink = %self.id, "Socket buffer full, datagram dropped");
                Ok(())
            }
            Err(e) => {
                error!(sink = %self.id, error = %e, "UDP send failed");
                self.writable.store(false, Ordering::Release);
                Err(ContractError::sink_unwritable(&self.id, e.to_string()))
            }
        }
    }
}
