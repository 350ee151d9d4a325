use crate::config::LinkConfig;
use crate::error::{Error, Result};
#[cfg(feature = "serial")]
use crate::serial_connection::SerialConnection;
#[cfg(feature = "tcp")]
use crate::tcp_connection::TcpConnection;
#[cfg(feature = "udp")]
use crate::udp_connection::UdpConnection;
use crate::Connection;
use log::info;
use std::net::SocketAddr;
use url::Url;

/// Context for the link connections
pub struct LinkContext {
    config: LinkConfig,
}

impl Default for LinkContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkContext {
    /// Create a new link context with the default ground station config
    pub fn new() -> Self {
        Self::with_config(LinkConfig::default())
    }

    pub fn with_config(config: LinkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Open a link connection
    ///
    /// Supported URIs:
    /// - `udpin://host:port` (or `udp://`): listen on the address, reply to the last sender
    /// - `udpout://host:port`: send to the address
    /// - `tcp://host:port`: connect to the address
    /// - `serial:///dev/ttyUSB0?baud=57600`: open a serial port, 115200 baud by default
    /// - `host:port`: same as `udpin://host:port`
    /// - `/dev/ttyUSB0`: same as `serial:///dev/ttyUSB0`
    ///
    /// Query pairs override the context config, see [LinkConfig].
    pub async fn open_link(&self, uri: &str) -> Result<Connection> {
        let uri = normalize_uri(uri);
        let config = self.config.with_query(&Url::parse(&uri)?)?;

        info!("Opening link {}", uri);

        #[cfg(feature = "udp")]
        {
            if let Some(connection) = UdpConnection::open(&config, &uri).await? {
                return Ok(Connection::new(&uri, config, Box::new(connection)));
            }
        }

        #[cfg(feature = "tcp")]
        {
            if let Some(connection) = TcpConnection::open(&config, &uri).await? {
                return Ok(Connection::new(&uri, config, Box::new(connection)));
            }
        }

        #[cfg(feature = "serial")]
        {
            if let Some(connection) = SerialConnection::open(&config, &uri).await? {
                return Ok(Connection::new(&uri, config, Box::new(connection)));
            }
        }

        Err(Error::InvalidUri)
    }
}

fn normalize_uri(uri: &str) -> String {
    if uri.contains("://") {
        uri.to_owned()
    } else if uri.starts_with('/') {
        format!("serial://{}", uri)
    } else {
        format!("udpin://{}", uri)
    }
}

/// Resolve the `host:port` part of a link URI
pub(crate) async fn resolve_address(uri: &Url) -> Result<SocketAddr> {
    let host = uri.host_str().ok_or(Error::InvalidUri)?;
    let port = uri.port().ok_or(Error::InvalidUri)?;

    // IPv6 hosts are bracketed in URIs
    let host = host.trim_start_matches('[').trim_end_matches(']');

    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or(Error::InvalidUri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_uri() {
        assert_eq!(normalize_uri("127.0.0.1:14550"), "udpin://127.0.0.1:14550");
        assert_eq!(normalize_uri("tcp://127.0.0.1:5760"), "tcp://127.0.0.1:5760");
        assert_eq!(normalize_uri("/dev/ttyUSB0"), "serial:///dev/ttyUSB0");
    }

    #[tokio::test]
    async fn test_resolve_address() {
        let uri = Url::parse("udpout://[::1]:14550").unwrap();
        assert_eq!(
            resolve_address(&uri).await.unwrap(),
            "[::1]:14550".parse().unwrap()
        );

        let uri = Url::parse("udpout://127.0.0.1").unwrap();
        assert!(matches!(resolve_address(&uri).await, Err(Error::InvalidUri)));
    }

    #[tokio::test]
    async fn test_open_unknown_scheme() {
        let context = LinkContext::new();
        assert!(matches!(
            context.open_link("can://can0").await,
            Err(Error::InvalidUri)
        ));
    }

    #[tokio::test]
    async fn test_open_invalid_query() {
        let context = LinkContext::new();
        assert!(matches!(
            context.open_link("udpout://127.0.0.1:14550?version=7").await,
            Err(Error::InvalidUri)
        ));
    }
}
