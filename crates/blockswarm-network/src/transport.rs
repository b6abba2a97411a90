//! # Transport Layer
//!
//! One request/response exchange per TCP connection. A single timeout
//! bounds the whole exchange: connect, write, and read.

use crate::codec::{read_frame, write_frame};
use crate::error::NetworkError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Transport layer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Timeout for one complete exchange
    pub request_timeout: Duration,

    /// Largest frame accepted in either direction
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(2),
            max_frame_size: 16 * 1024 * 1024,
        }
    }
}

/// Exchange statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub exchanges: u64,
    pub failures: u64,
    pub timeouts: u64,
}

/// TCP request/response transport
pub struct TcpTransport {
    config: TransportConfig,
    stats: parking_lot::RwLock<ConnectionStats>,
}

impl TcpTransport {
    /// Create new transport
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            stats: parking_lot::RwLock::new(ConnectionStats::default()),
        }
    }

    /// Get exchange statistics
    pub fn stats(&self) -> ConnectionStats {
        self.stats.read().clone()
    }

    /// Send `request` to `destination` and wait for one response
    pub async fn exchange<Req, Resp>(&self, destination: SocketAddr, request: &Req) -> Result<Resp, NetworkError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let max_frame_size = self.config.max_frame_size;
        let exchange = async {
            let mut stream = TcpStream::connect(destination).await?;
            write_frame(&mut stream, request, max_frame_size).await?;
            read_frame::<_, Resp>(&mut stream, max_frame_size).await
        };

        let result = match timeout(self.config.request_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout),
        };

        let mut stats = self.stats.write();
        stats.exchanges += 1;
        match &result {
            Ok(_) => {}
            Err(NetworkError::Timeout) => {
                stats.failures += 1;
                stats.timeouts += 1;
            }
            Err(_) => stats.failures += 1,
        }
        drop(stats);

        if let Err(e) = &result {
            tracing::trace!(
                %destination,
                error = %e,
                protocol_violation = e.is_protocol_violation(),
                "Exchange failed"
            );
        }
        result
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{PeerRequest, PeerResponse};
    use tokio::net::TcpListener;

    fn fast_config() -> TransportConfig {
        TransportConfig {
            request_timeout: Duration::from_millis(300),
            max_frame_size: 1024,
        }
    }

    #[tokio::test]
    async fn test_exchange_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request: PeerRequest = read_frame(&mut stream, 1024).await.unwrap();
            assert_eq!(request, PeerRequest::List);
            write_frame(&mut stream, &PeerResponse::Inventory(vec![0, 2]), 1024)
                .await
                .unwrap();
        });

        let transport = TcpTransport::new(fast_config());
        let response: PeerResponse = transport.exchange(addr, &PeerRequest::List).await.unwrap();

        assert_eq!(response, PeerResponse::Inventory(vec![0, 2]));
        assert_eq!(transport.stats().exchanges, 1);
        assert_eq!(transport.stats().failures, 0);
    }

    #[tokio::test]
    async fn test_exchange_times_out_on_silent_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept and hold the connection open without answering
        let holder = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        });

        let transport = TcpTransport::new(fast_config());
        let result: Result<PeerResponse, _> = transport.exchange(addr, &PeerRequest::List).await;

        assert!(matches!(result, Err(NetworkError::Timeout)));
        assert_eq!(transport.stats().timeouts, 1);
        holder.abort();
    }

    #[tokio::test]
    async fn test_exchange_refused() {
        // Bind then drop to get a port with nothing listening
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let transport = TcpTransport::new(fast_config());
        let result: Result<PeerResponse, _> = transport.exchange(addr, &PeerRequest::List).await;

        assert!(result.is_err());
        assert_eq!(transport.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_exchange_closed_without_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _: Result<PeerRequest, _> = read_frame(&mut stream, 1024).await;
            // Dropped without writing
        });

        let transport = TcpTransport::new(fast_config());
        let result: Result<PeerResponse, _> = transport.exchange(addr, &PeerRequest::List).await;
        assert!(matches!(result, Err(NetworkError::ConnectionClosed)));
    }
}
