//! Command channel client.

use std::time::Duration;

use async_trait::async_trait;
use maya_bridge_core::{CommandSender, Endpoint, TransportError};
use tokio::{io::AsyncWriteExt, net::TcpStream};

/// Default bound on connecting to a command port.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default bound on writing and flushing a command.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default pause between writing a command and closing the connection.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Sends commands over short-lived TCP connections.
///
/// Maya's command port reads the stream on its own idle tick, so the
/// connection is held open briefly after writing before it is closed.
#[derive(Debug, Clone)]
pub struct CommandClient {
    connect_timeout: Duration,
    write_timeout: Duration,
    settle_delay: Duration,
}

impl Default for CommandClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandClient {
    /// Create a client with the default timings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Override the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the write timeout.
    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Override the post-write settle delay.
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<TcpStream, TransportError> {
        let authority = endpoint.authority();
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(authority.as_str())).await
        {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(TransportError::Connect {
                endpoint: endpoint.clone(),
                source,
            }),
            Err(_) => Err(TransportError::Timeout {
                endpoint: endpoint.clone(),
            }),
        }
    }
}

async fn write_command(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
    stream.write_all(payload).await?;
    stream.flush().await
}

#[async_trait]
impl CommandSender for CommandClient {
    async fn send(&self, endpoint: &Endpoint, payload: &[u8]) -> Result<(), TransportError> {
        let mut stream = self.connect(endpoint).await?;

        // The stream is dropped, and therefore closed, on every return below.
        match tokio::time::timeout(self.write_timeout, write_command(&mut stream, payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                return Err(TransportError::Write {
                    endpoint: endpoint.clone(),
                    source,
                });
            }
            Err(_) => {
                tracing::warn!(%endpoint, "Command port stopped reading");
                return Err(TransportError::WriteTimeout {
                    endpoint: endpoint.clone(),
                });
            }
        }

        tokio::time::sleep(self.settle_delay).await;

        if let Err(e) = stream.shutdown().await {
            tracing::debug!(%endpoint, "Command connection shutdown failed: {e}");
        }
        tracing::debug!(%endpoint, bytes = payload.len(), "Command sent");
        Ok(())
    }
}
