use crate::config::LinkConfig;
use crate::connection::{ConnectionTrait, Downlink};
use crate::context::resolve_address;
use crate::error::{Error, Result};
use crate::ConnectionStatus;
use async_trait::async_trait;
use futures_channel::oneshot;
use futures_util::lock::Mutex;
use log::{debug, info};
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

const DISCONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READ_BUFFER_SIZE: usize = 4096;

/// TCP link connection, ie. to a SITL instance or a telemetry bridge
pub struct TcpConnection {
    status: Arc<Mutex<ConnectionStatus>>,
    uplink: flume::Sender<Vec<u8>>,
    downlink: flume::Receiver<Vec<u8>>,
    disconnect_channel: flume::Receiver<()>,
    disconnect: Arc<AtomicBool>,
}

impl TcpConnection {
    pub async fn open(config: &LinkConfig, uri: &str) -> Result<Option<TcpConnection>> {
        let address = match Self::parse_uri(uri).await {
            Ok(address) => address,
            Err(Error::InvalidUriScheme) => {
                return Ok(None);
            }
            Err(e) => {
                return Err(e);
            }
        };

        let stream = TcpStream::connect(address).await?;
        let connection = TcpConnection::new(stream, config.queue_size).await?;

        Ok(Some(connection))
    }

    async fn new(stream: TcpStream, queue_size: usize) -> Result<TcpConnection> {
        let status = Arc::new(Mutex::new(ConnectionStatus::Connecting));

        let (disconnect_channel_tx, disconnect_channel_rx) = flume::bounded(0);
        let disconnect = Arc::new(AtomicBool::new(false));

        let (uplink_send, uplink_recv) = flume::bounded(queue_size);
        let (downlink, downlink_recv) = Downlink::new(queue_size);

        let (connection_initialized_send, connection_initialized) = oneshot::channel();

        let mut thread = ConnectionThread {
            stream,
            status: status.clone(),
            disconnect_channel: disconnect_channel_tx,
            uplink: uplink_recv,
            downlink,
            disconnect: disconnect.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = thread.run(connection_initialized_send).await {
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

        Ok(TcpConnection {
            status,
            disconnect_channel: disconnect_channel_rx,
            uplink: uplink_send,
            downlink: downlink_recv,
            disconnect,
        })
    }

    async fn parse_uri(uri: &str) -> Result<SocketAddr> {
        let uri = Url::parse(uri)?;

        if uri.scheme() != "tcp" {
            return Err(Error::InvalidUriScheme);
        }

        resolve_address(&uri).await
    }
}

#[async_trait]
impl ConnectionTrait for TcpConnection {
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

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.disconnect.store(true, Relaxed);
    }
}

enum Event {
    Read(std::io::Result<usize>),
    Uplink(std::result::Result<Vec<u8>, flume::RecvError>),
    Tick,
}

struct ConnectionThread {
    stream: TcpStream,
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

    async fn run(&mut self, connection_initialized: oneshot::Sender<()>) -> Result<()> {
        info!("TCP link to {}", self.stream.peer_addr()?);

        self.update_status(ConnectionStatus::Connected).await;
        let _ = connection_initialized.send(());

        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            let event = tokio::select! {
                read = self.stream.read(&mut buf) => Event::Read(read),
                packet = self.uplink.recv_async() => Event::Uplink(packet),
                _ = tokio::time::sleep(DISCONNECT_POLL_INTERVAL) => Event::Tick,
            };

            match event {
                Event::Read(Ok(0)) => {
                    info!("TCP link closed by peer");
                    self.update_status(ConnectionStatus::Disconnected(
                        "Connection closed by peer".to_owned(),
                    ))
                    .await;
                    return Ok(());
                }
                Event::Read(Ok(n)) => {
                    debug!("Received {} bytes", n);
                    self.downlink.push(buf[..n].to_vec());
                }
                Event::Read(Err(e)) => return Err(e.into()),
                Event::Uplink(Ok(packet)) => self.stream.write_all(&packet).await?,
                // Connection object dropped
                Event::Uplink(Err(_)) => self.disconnect.store(true, Relaxed),
                Event::Tick => {}
            }

            // If the connection object has been dropped, leave the thread
            if self.disconnect.load(Relaxed) {
                debug!("Disconnect requested, leaving connection loop.");
                // Packets queued before the close are still sent
                while let Ok(packet) = self.uplink.try_recv() {
                    self.stream.write_all(&packet).await?;
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
        let address = TcpConnection::parse_uri("tcp://127.0.0.1:5760").await.unwrap();
        assert_eq!(address, "127.0.0.1:5760".parse().unwrap());

        assert!(matches!(
            TcpConnection::parse_uri("udpin://127.0.0.1:14550").await,
            Err(Error::InvalidUriScheme)
        ));
    }
}
