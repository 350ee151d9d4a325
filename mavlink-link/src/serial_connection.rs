use crate::config::LinkConfig;
use crate::connection::{ConnectionTrait, Downlink};
use crate::error::{Error, Result};
use crate::ConnectionStatus;
use async_trait::async_trait;
use futures_channel::oneshot;
use futures_util::lock::Mutex;
use log::{debug, info};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use url::Url;

const DISCONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READ_BUFFER_SIZE: usize = 1024;
const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial port link connection, ie. a telemetry radio or a flight controller USB port
///
/// URI: `serial:///dev/ttyUSB0?baud=57600`, or `serial://COM3` on Windows. The
/// baud rate defaults to 115200.
pub struct SerialConnection {
    status: Arc<Mutex<ConnectionStatus>>,
    uplink: flume::Sender<Vec<u8>>,
    downlink: flume::Receiver<Vec<u8>>,
    disconnect_channel: flume::Receiver<()>,
    disconnect: Arc<AtomicBool>,
}

impl SerialConnection {
    pub async fn open(config: &LinkConfig, uri: &str) -> Result<Option<SerialConnection>> {
        let (port, baud_rate) = match Self::parse_uri(uri) {
            Ok(port) => port,
            Err(Error::InvalidUriScheme) => {
                return Ok(None);
            }
            Err(e) => {
                return Err(e);
            }
        };

        let stream = tokio_serial::new(&port, baud_rate)
            .open_native_async()
            .map_err(std::io::Error::from)?;
        info!("Serial link on {} at {} baud", port, baud_rate);

        let connection = SerialConnection::new(stream, config.queue_size).await?;

        Ok(Some(connection))
    }

    async fn new(stream: SerialStream, queue_size: usize) -> Result<SerialConnection> {
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

        Ok(SerialConnection {
            status,
            disconnect_channel: disconnect_channel_rx,
            uplink: uplink_send,
            downlink: downlink_recv,
            disconnect,
        })
    }

    fn parse_uri(uri: &str) -> Result<(String, u32)> {
        let uri = Url::parse(uri)?;

        if uri.scheme() != "serial" {
            return Err(Error::InvalidUriScheme);
        }

        let port = match uri.host_str() {
            Some(host) if !host.is_empty() => host.to_owned(),
            _ => uri.path().to_owned(),
        };
        if port.is_empty() || port == "/" {
            return Err(Error::InvalidUri);
        }

        let mut baud_rate = DEFAULT_BAUD_RATE;
        for (key, value) in uri.query_pairs() {
            if key == "baud" {
                baud_rate = value.parse()?;
            }
        }

        Ok((port, baud_rate))
    }
}

#[async_trait]
impl ConnectionTrait for SerialConnection {
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

impl Drop for SerialConnection {
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
    stream: SerialStream,
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
                    info!("Serial port closed");
                    self.update_status(ConnectionStatus::Disconnected(
                        "Serial port closed".to_owned(),
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

    #[test]
    fn test_parse_uri() {
        assert_eq!(
            SerialConnection::parse_uri("serial:///dev/ttyUSB0?baud=57600").unwrap(),
            ("/dev/ttyUSB0".to_owned(), 57600)
        );
        assert_eq!(
            SerialConnection::parse_uri("serial:///dev/ttyACM0").unwrap(),
            ("/dev/ttyACM0".to_owned(), DEFAULT_BAUD_RATE)
        );
        assert_eq!(
            SerialConnection::parse_uri("serial://COM3?baud=921600").unwrap(),
            ("COM3".to_owned(), 921600)
        );
    }

    #[test]
    fn test_parse_uri_errors() {
        assert!(matches!(
            SerialConnection::parse_uri("tcp://127.0.0.1:5760"),
            Err(Error::InvalidUriScheme)
        ));
        assert!(matches!(
            SerialConnection::parse_uri("serial:///dev/ttyUSB0?baud=fast"),
            Err(Error::InvalidUri)
        ));
    }

    #[tokio::test]
    async fn test_open_missing_port() {
        let result =
            SerialConnection::open(&LinkConfig::default(), "serial:///dev/mavlink-link-missing")
                .await;
        assert!(matches!(result, Err(Error::IoError(_))));
    }
}
