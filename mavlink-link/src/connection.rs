use crate::config::LinkConfig;
use crate::error::Result;
use crate::message::{
    command_long, gcs_heartbeat, is_vehicle_heartbeat, message_name, MavCmd, MavHeader,
    MavMessage, HEARTBEAT_DATA,
};
use crate::parser::{serialize, FrameParser};
use async_trait::async_trait;
use futures_util::lock::Mutex;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

/// Describe the current link connection status
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The transport is being set up
    Connecting,
    /// The transport is open and the connection task is running
    Connected,
    /// The link is disconnected, the string contains the human-readable reason
    Disconnected(String),
}

// Describes the interface of a transport moving raw MAVLink bytes to and from a vehicle
#[async_trait]
pub trait ConnectionTrait {
    /// Wait for the connection to be closed. Returns the message stored in the
    /// disconnected connection status that indicate the reason for the disconnection
    async fn wait_close(&self) -> String;

    /// Close the connection and wait for the connection task to stop.
    ///
    /// The connection can also be closed by simply dropping the connection object.
    async fn close(&self);

    /// Return the connection status
    async fn status(&self) -> ConnectionStatus;

    /// Block until the connection is dropped. The `status()` function can be used to get the reason
    /// for the disconnection.
    async fn wait_disconnect(&self);

    /// Queue bytes for transmission
    ///
    /// This function can return an error if the connection task is not active anymore.
    async fn send_bytes(&self, data: Vec<u8>) -> Result<()>;

    /// Receive the next chunk of bytes (one datagram for UDP)
    ///
    /// This function can return an error if the connection task is not active anymore.
    async fn recv_bytes(&self) -> Result<Vec<u8>>;
}

/// Bounded queue of received bytes, filled by a connection task.
///
/// Pushing never blocks: when nobody reads the link the oldest chunk is
/// dropped, so that the task keeps sending and watching for disconnection.
pub(crate) struct Downlink {
    sender: flume::Sender<Vec<u8>>,
    oldest: flume::Receiver<Vec<u8>>,
}

impl Downlink {
    pub(crate) fn new(queue_size: usize) -> (Downlink, flume::Receiver<Vec<u8>>) {
        let (sender, receiver) = flume::bounded(queue_size);
        let downlink = Downlink {
            sender,
            oldest: receiver.clone(),
        };
        (downlink, receiver)
    }

    pub(crate) fn push(&self, data: Vec<u8>) {
        if let Err(flume::TrySendError::Full(data)) = self.sender.try_send(data) {
            debug!("Downlink queue full, dropping the oldest received data");
            let _ = self.oldest.try_recv();
            let _ = self.sender.try_send(data);
        }
    }
}

/// Connection to a vehicle
///
/// Keeps the identification of the vehicle on the other side of the link and the
/// last received message of each type. Both are only updated while receiving:
/// [Connection::wait_heartbeat], [Connection::recv_match] or [Connection::recv_message].
pub struct Connection {
    uri: String,
    config: LinkConfig,
    /// Reference to the internal transport object
    internal_connection: Box<dyn ConnectionTrait + Send + Sync>,
    parser: Mutex<FrameParser>,
    messages: Mutex<HashMap<String, MavMessage>>,
    sequence: AtomicU8,
    target_system: AtomicU8,
    target_component: AtomicU8,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection({})", self.uri)
    }
}

impl Connection {
    /// Create a new connection object
    pub fn new(
        uri: &str,
        config: LinkConfig,
        internal_connection: Box<dyn ConnectionTrait + Send + Sync>,
    ) -> Self {
        Self {
            uri: uri.to_owned(),
            config,
            internal_connection,
            parser: Mutex::new(FrameParser::new()),
            messages: Mutex::new(HashMap::new()),
            sequence: AtomicU8::new(0),
            target_system: AtomicU8::new(0),
            target_component: AtomicU8::new(0),
        }
    }

    /// URI the connection was opened with
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Wait for the connection to be closed. Returns the message stored in the
    /// disconnected connection status that indicate the reason for the disconnection
    pub async fn wait_close(&self) -> String {
        self.internal_connection.wait_close().await
    }

    /// Close the connection and wait for the connection task to stop.
    ///
    /// Messages already sent are transmitted before the task stops.
    pub async fn close(&self) {
        self.internal_connection.close().await
    }

    /// Return the connection status
    pub async fn status(&self) -> ConnectionStatus {
        self.internal_connection.status().await
    }

    /// Block until the connection is dropped. The `status()` function can be used to get the reason
    /// for the disconnection.
    pub async fn wait_disconnect(&self) {
        self.internal_connection.wait_disconnect().await
    }

    /// System id of the vehicle, 0 until a vehicle heartbeat has been received
    pub fn target_system(&self) -> u8 {
        self.target_system.load(Acquire)
    }

    /// Component id of the vehicle, 0 until a vehicle heartbeat has been received
    pub fn target_component(&self) -> u8 {
        self.target_component.load(Acquire)
    }

    /// Snapshot of the last received message of each type, keyed by message name
    pub async fn messages(&self) -> HashMap<String, MavMessage> {
        self.messages.lock().await.clone()
    }

    /// Last received message with the given name, ie. `"HEARTBEAT"`
    pub async fn message(&self, name: &str) -> Option<MavMessage> {
        self.messages.lock().await.get(name).cloned()
    }

    /// Receive the next valid message together with its frame header
    ///
    /// Corrupted frames are skipped.
    pub async fn recv_frame(&self) -> Result<(MavHeader, MavMessage)> {
        let mut parser = self.parser.lock().await;

        loop {
            match parser.next_message() {
                Some(Ok((header, message))) => {
                    self.post_message(&header, &message).await;
                    return Ok((header, message));
                }
                Some(Err(e)) => debug!("Dropping received data: {}", e),
                None => {
                    let data = self.internal_connection.recv_bytes().await?;
                    parser.push(&data);
                }
            }
        }
    }

    /// Receive the next message
    pub async fn recv_message(&self) -> Result<MavMessage> {
        let (_, message) = self.recv_frame().await?;
        Ok(message)
    }

    /// Receive messages until one with the given name arrives
    pub async fn recv_match(&self, name: &str) -> Result<MavMessage> {
        loop {
            let message = self.recv_message().await?;
            if message_name(&message) == name {
                return Ok(message);
            }
        }
    }

    /// Block until a heartbeat is received.
    ///
    /// There is no timeout: if the other side never sends a heartbeat this never
    /// returns. Wrap it in `tokio::time::timeout` to bound the wait.
    pub async fn wait_heartbeat(&self) -> Result<HEARTBEAT_DATA> {
        loop {
            if let MavMessage::HEARTBEAT(heartbeat) = self.recv_message().await? {
                return Ok(heartbeat);
            }
        }
    }

    async fn post_message(&self, header: &MavHeader, message: &MavMessage) {
        if let MavMessage::HEARTBEAT(heartbeat) = message {
            if self.target_system() == 0
                && header.system_id != 0
                && is_vehicle_heartbeat(heartbeat)
            {
                self.target_component.store(header.component_id, Release);
                self.target_system.store(header.system_id, Release);
                info!(
                    "Target is system {} component {}",
                    header.system_id, header.component_id
                );
            }
        }

        self.messages
            .lock()
            .await
            .insert(message_name(message).to_owned(), message.clone());
    }

    /// Send a message. Fire and forget, no acknowledgment is awaited
    pub async fn send_message(&self, message: &MavMessage) -> Result<()> {
        let header = MavHeader {
            system_id: self.config.source_system,
            component_id: self.config.source_component,
            sequence: self.sequence.fetch_add(1, Relaxed),
        };
        let bytes = serialize(self.config.version, header, message)?;

        debug!("Sending {} {}", message_name(message), hex::encode(&bytes));
        self.internal_connection.send_bytes(bytes).await
    }

    /// Send a COMMAND_LONG
    pub async fn command_long_send(
        &self,
        target_system: u8,
        target_component: u8,
        command: MavCmd,
        confirmation: u8,
        params: [f32; 7],
    ) -> Result<()> {
        let command = command_long(
            target_system,
            target_component,
            command,
            confirmation,
            params,
        );
        self.send_message(&MavMessage::COMMAND_LONG(command)).await
    }

    /// Send MAV_CMD_NAV_TAKEOFF to the vehicle on the other side of the link.
    ///
    /// The target ids are used as they are: call [Connection::wait_heartbeat] first
    /// so that they are resolved.
    pub async fn send_takeoff(&self, confirmation: u8, params: [f32; 7]) -> Result<()> {
        if self.target_system() == 0 {
            warn!("Sending takeoff before any vehicle heartbeat, target system is 0");
        }

        self.command_long_send(
            self.target_system(),
            self.target_component(),
            MavCmd::MAV_CMD_NAV_TAKEOFF,
            confirmation,
            params,
        )
        .await
    }

    /// Announce this end of the link as a ground control station
    pub async fn heartbeat_send(&self) -> Result<()> {
        self.send_message(&MavMessage::HEARTBEAT(gcs_heartbeat()))
            .await
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    /// In-memory transport: bytes pushed on `incoming` are received, sent bytes land in `outgoing`
    pub(crate) struct MockConnection {
        incoming: flume::Receiver<Vec<u8>>,
        outgoing: flume::Sender<Vec<u8>>,
    }

    pub(crate) fn connection() -> (Connection, flume::Sender<Vec<u8>>, flume::Receiver<Vec<u8>>) {
        let (incoming_tx, incoming) = flume::unbounded();
        let (outgoing, outgoing_rx) = flume::unbounded();
        let mock = MockConnection { incoming, outgoing };

        let connection = Connection::new("mock://vehicle", LinkConfig::default(), Box::new(mock));
        (connection, incoming_tx, outgoing_rx)
    }

    /// Frame a message the way a vehicle would
    pub(crate) fn frame(system_id: u8, component_id: u8, message: &MavMessage) -> Vec<u8> {
        let header = MavHeader {
            system_id,
            component_id,
            sequence: 0,
        };
        serialize(crate::MavlinkVersion::V1, header, message).unwrap()
    }

    /// Decode one frame sent on the link
    pub(crate) fn sent(outgoing: &flume::Receiver<Vec<u8>>) -> (MavHeader, MavMessage) {
        let mut parser = FrameParser::new();
        parser.push(&outgoing.recv().unwrap());
        parser.next_message().unwrap().unwrap()
    }

    #[async_trait]
    impl ConnectionTrait for MockConnection {
        async fn wait_close(&self) -> String {
            "Connection closed".to_owned()
        }

        async fn close(&self) {}

        async fn status(&self) -> ConnectionStatus {
            ConnectionStatus::Connected
        }

        async fn wait_disconnect(&self) {}

        async fn send_bytes(&self, data: Vec<u8>) -> Result<()> {
            self.outgoing.send_async(data).await?;
            Ok(())
        }

        async fn recv_bytes(&self) -> Result<Vec<u8>> {
            Ok(self.incoming.recv_async().await?)
        }
    }
}
