use crate::config::LinkConfig;
use crate::connection::{ConnectionTrait, Downlink};
use crate::context::resolve_address;
use crate::error::{Error, Result};
use crate::ConnectionStatus;
use async_trait::async_trait;
use futures_channel::oneshot;
use futures_util::lock::Mutex;
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use url::Url;

const DISCONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_DATAGRAM_SIZE: usize = 65_507;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UdpMode {
    /// Listen on the address, answer to whoever sent the last datagram
    Input,
    /// Send to the address
    Output,
}

/// UDP link connection
pub struct UdpConnection {
    status: Arc<Mutex<ConnectionStatus>>,
    uplink: flume::Sender<Vec<u8>>,
    downlink: flume::Receiver<Vec<u8>>,
    disconnect_channel: flume::Receiver<()>,
    disconnect: Arc<AtomicBool>,
}

impl UdpConnection {
    pub async fn open(config: &LinkConfig, uri: &str) -> Result<Option<UdpConnection>> {
        let (mode, address) = match Self::parse_uri(uri).await {
            Ok((mode, address)) => (mode, address),
            Err(Error::InvalidUriScheme) => {
                return Ok(None);
            }
            Err(e) => {
                return Err(e);
            }
        };

        let socket = match mode {
            UdpMode::Input => UdpSocket::bind(address).await?,
            UdpMode::Output => {
                let local: SocketAddr = if address.is_ipv4() {
                    ([0, 0, 0, 0], 0).into()
                } else {
                    ([0u16; 8], 0).into()
                };
                let socket = UdpSocket::bind(local).await?;
                socket.connect(address).await?;
                socket
            }
        };

        let connection = UdpConnection::new(socket, mode, config.queue_size).await?;

        Ok(Some(connection))
    }

    async fn new(socket: UdpSocket, mode: UdpMode, queue_size: usize) -> Result<UdpConnection> {
        let status = Arc::new(Mutex::new(ConnectionStatus::Connecting));

        let (disconnect_channel_tx, disconnect_channel_rx) = flume::bounded(0);
        let disconnect = Arc::new(AtomicBool::new(false));

        let (uplink_send, uplink_recv) = flume::bounded(queue_size);
        let (downlink, downlink_recv) = Downlink::new(queue_size);

        let (connection_initialized_send, connection_initialized) = oneshot::channel();

        let mut thread = ConnectionThread {
            socket,
            mode,
            peer: None,
            status: status.clone(),
            disconnect_channel: disconnect_channel_tx,
            uplink: uplink_recv,
            downlink,
            disconnect: disconnect.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = thread.run(connection_initialized_send).await {
                warn!("UDP connection task stopped: {}", e);
                thread
                    .update_status(ConnectionStatus::Disconnected(format!(
                        "Connection error: {}",
                        e
                    )))
                    .await;
            }
            drop(thread.disconnect_channel);
        });

        // Wait for the connection task to be running
        let _ = connection_initialized.await;

        Ok(UdpConnection {
            status,
            disconnect_channel: disconnect_channel_rx,
            uplink: uplink_send,
            downlink: downlink_recv,
            disconnect,
        })
    }

    async fn parse_uri(uri: &str) -> Result<(UdpMode, SocketAddr)> {
        let uri = Url::parse(uri)?;

        // "udp" behaves like "udpin", as ground station tools do
        let mode = match uri.scheme() {
            "udpin" | "udp" => UdpMode::Input,
            "udpout" => UdpMode::Output,
            _ => return Err(Error::InvalidUriScheme),
        };

        let address = resolve_address(&uri).await?;

        Ok((mode, address))
    }
}

#[async_trait]
impl ConnectionTrait for UdpConnection {
    async fn wait_close(&self) -> String {
        // Wait for the connection thread to drop the disconnect channel
        let _ = self.disconnect_channel.recv_async().await;
        if let ConnectionStatus::Disconnected(reason) = self.status().await {
            reason
        } else {
            "Still connected!".to_owned()
        }
    }

    async fn close(&self) {
        self.disconnect.store(true, Relaxed);
        let _ = self.disconnect_channel.recv_async().await;
    }

    async fn status(&self) -> ConnectionStatus {
        self.status.lock().await.clone()
    }

    async fn wait_disconnect(&self) {
        // The channel will return an error when the other side, in the connection thread, is dropped
        let _ = self.disconnect_channel.recv_async().await;
    }

    async fn send_bytes(&self, data: Vec<u8>) -> Result<()> {
        self.uplink.send_async(data).await?;
        Ok(())
    }

    async fn recv_bytes(&self) -> Result<Vec<u8>> {
        let data = self.downlink.recv_async().await?;
        Ok(data)
    }
}

impl Drop for UdpConnection {
    fn drop(&mut self) {
        self.disconnect.store(true, Relaxed);
    }
}

enum Event {
    Received(std::io::Result<(usize, SocketAddr)>),
    Uplink(std::result::Result<Vec<u8>, flume::RecvError>),
    Tick,
}

struct ConnectionThread {
    socket: UdpSocket,
    mode: UdpMode,
    peer: Option<SocketAddr>,
    status: Arc<Mutex<ConnectionStatus>>,
    disconnect_channel: flume::Sender<()>,
    uplink: flume::Receiver<Vec<u8>>,
    downlink: Downlink,
    disconnect: Arc<AtomicBool>,
}

impl ConnectionThread {
    async fn update_status(&self, new_status: ConnectionStatus) {
        debug!("New status: {:?}", &new_status);
        let mut status = self.status.lock().await;
        *status = new_status;
    }

    async fn send(&mut self, packet: Vec<u8>) -> Result<()> {
        match (self.mode, self.peer) {
            (UdpMode::Output, _) => {
                self.socket.send(&packet).await?;
            }
            (UdpMode::Input, Some(peer)) => {
                self.socket.send_to(&packet, peer).await?;
            }
            (UdpMode::Input, None) => {
                warn!("No peer on the link yet, dropping {} bytes", packet.len());
            }
        }
        Ok(())
    }

    async fn run(&mut self, connection_initialized: oneshot::Sender<()>) -> Result<()> {
        info!(
            "UDP link on {} ({:?})",
            self.socket.local_addr()?,
            self.mode
        );

        self.update_status(ConnectionStatus::Connected).await;
        let _ = connection_initialized.send(());

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let event = tokio::select! {
                received = self.socket.recv_from(&mut buf) => Event::Received(received),
                packet = self.uplink.recv_async() => Event::Uplink(packet),
                _ = tokio::time::sleep(DISCONNECT_POLL_INTERVAL) => Event::Tick,
            };

            match event {
                Event::Received(Ok((n, peer))) => {
                    if self.mode == UdpMode::Input && self.peer != Some(peer) {
                        info!("Link peer is now {}", peer);
                        self.peer = Some(peer);
                    }
                    debug!("Received {} bytes from {}", n, peer);
                    self.downlink.push(buf[..n].to_vec());
                }
                // Nobody listening (yet) on the other side of an output link
                Event::Received(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                    debug!("Datagram refused by peer");
                }
                Event::Received(Err(e)) => return Err(e.into()),
                Event::Uplink(Ok(packet)) => self.send(packet).await?,
                // Connection object dropped
                Event::Uplink(Err(_)) => self.disconnect.store(true, Relaxed),
                Event::Tick => {}
            }

            // If the connection object has been dropped, leave the thread
            if self.disconnect.load(Relaxed) {
                debug!("Disconnect requested, leaving connection loop.");
                // Packets queued before the close are still sent
                while let Ok(packet) = self.uplink.try_recv() {
                    self.send(packet).await?;
                }
                self.update_status(ConnectionStatus::Disconnected(
                    "Connection closed".to_owned(),
                ))
                .await;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parse_uri() {
        let (mode, address) = UdpConnection::parse_uri("udpin://127.0.0.1:14550")
            .await
            .unwrap();
        assert_eq!(mode, UdpMode::Input);
        assert_eq!(address, "127.0.0.1:14550".parse().unwrap());

        let (mode, _) = UdpConnection::parse_uri("udpout://127.0.0.1:14550?version=2")
            .await
            .unwrap();
        assert_eq!(mode, UdpMode::Output);

        let (mode, _) = UdpConnection::parse_uri("udp://127.0.0.1:14550")
            .await
            .unwrap();
        assert_eq!(mode, UdpMode::Input);
    }

    #[tokio::test]
    async fn test_parse_uri_errors() {
        assert!(matches!(
            UdpConnection::parse_uri("tcp://127.0.0.1:5760").await,
            Err(Error::InvalidUriScheme)
        ));
        assert!(matches!(
            UdpConnection::parse_uri("udpin://127.0.0.1").await,
            Err(Error::InvalidUri)
        ));
    }

    #[tokio::test]
    async fn test_open_foreign_scheme() {
        let connection = UdpConnection::open(&LinkConfig::default(), "tcp://127.0.0.1:5760")
            .await
            .unwrap();
        assert!(connection.is_none());
    }
}
