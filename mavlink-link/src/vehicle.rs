//! Vehicle telemetry tracking and high level commands on top of a [Connection]
//!
//! The state only starts tracking once a first heartbeat has been received: the
//! heartbeat tells what kind of vehicle is on the other side of the link.

use crate::error::Result;
use crate::message::{
    command_long, is_armed, message_name, MavCmd, MavMessage, MavModeFlag, MavType,
    GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA, REQUEST_DATA_STREAM_DATA, STATUSTEXT_DATA,
    VFR_HUD_DATA,
};
use crate::Connection;
use log::{debug, info};
use std::fmt;

/// ArduCopter GUIDED flight mode number
pub const COPTER_MODE_GUIDED: u32 = 4;

/// Airframe reported in the heartbeat `type` field
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Airframe {
    FixedWing,
    Quadrotor,
    Coaxial,
    Helicopter,
    GroundRover,
    SurfaceBoat,
    Submarine,
    Hexarotor,
    Octorotor,
    Tricopter,
    Unknown(MavType),
}

impl From<MavType> for Airframe {
    fn from(mav_type: MavType) -> Self {
        match mav_type {
            MavType::MAV_TYPE_FIXED_WING => Airframe::FixedWing,
            MavType::MAV_TYPE_QUADROTOR => Airframe::Quadrotor,
            MavType::MAV_TYPE_COAXIAL => Airframe::Coaxial,
            MavType::MAV_TYPE_HELICOPTER => Airframe::Helicopter,
            MavType::MAV_TYPE_GROUND_ROVER => Airframe::GroundRover,
            MavType::MAV_TYPE_SURFACE_BOAT => Airframe::SurfaceBoat,
            MavType::MAV_TYPE_SUBMARINE => Airframe::Submarine,
            MavType::MAV_TYPE_HEXAROTOR => Airframe::Hexarotor,
            MavType::MAV_TYPE_OCTOROTOR => Airframe::Octorotor,
            MavType::MAV_TYPE_TRICOPTER => Airframe::Tricopter,
            other => Airframe::Unknown(other),
        }
    }
}

impl fmt::Display for Airframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Airframe::FixedWing => "FIXED WING",
            Airframe::Quadrotor => "QUADROTOR",
            Airframe::Coaxial => "COAXIAL",
            Airframe::Helicopter => "HELICOPTER",
            Airframe::GroundRover => "GROUND ROVER",
            Airframe::SurfaceBoat => "SURFACE BOAT",
            Airframe::Submarine => "SUBMARINE",
            Airframe::Hexarotor => "HEXAROTOR",
            Airframe::Octorotor => "OCTOROTOR",
            Airframe::Tricopter => "TRICOPTER",
            Airframe::Unknown(_) => "UNKNOWN",
        };
        write!(f, "{}", name)
    }
}

/// Global position in degrees and meters
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_relative: f64,
    pub altitude_amsl: f64,
    /// None if the autopilot does not know its heading
    pub heading: Option<f64>,
}

impl From<&GLOBAL_POSITION_INT_DATA> for Position {
    fn from(m: &GLOBAL_POSITION_INT_DATA) -> Self {
        Position {
            latitude: m.lat as f64 / 1e7,
            longitude: m.lon as f64 / 1e7,
            altitude_relative: m.relative_alt as f64 / 1000.0,
            altitude_amsl: m.alt as f64 / 1000.0,
            heading: if m.hdg == u16::MAX {
                None
            } else {
                Some(m.hdg as f64 / 100.0)
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlightState {
    pub armed: bool,
    pub custom_mode: u32,
    pub climb_rate: f64,
    pub airspeed: f64,
    pub groundspeed: f64,
    /// Percent
    pub throttle: f64,
}

#[derive(Clone, Debug, Default)]
pub struct VehicleState {
    connected: bool,
    airframe: Option<Airframe>,
    position: Option<Position>,
    flight_state: FlightState,
}

impl VehicleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a heartbeat has been received
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn airframe(&self) -> Option<Airframe> {
        self.airframe
    }

    /// Last known position, None until a GLOBAL_POSITION_INT has been received
    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn flight_state(&self) -> &FlightState {
        &self.flight_state
    }

    /// Apply a received message
    pub fn update(&mut self, message: &MavMessage) {
        match message {
            MavMessage::HEARTBEAT(heartbeat) if !self.connected => {
                self.process_initial_heartbeat(heartbeat)
            }
            _ if !self.connected => {
                debug!("Ignoring {} before the first heartbeat", message_name(message))
            }
            MavMessage::HEARTBEAT(heartbeat) => self.update_mode(heartbeat),
            MavMessage::GLOBAL_POSITION_INT(position) => self.position = Some(position.into()),
            MavMessage::VFR_HUD(hud) => self.update_flight_state(hud),
            MavMessage::STATUSTEXT(text) => info!("Vehicle: {}", status_text(text)),
            _ => {}
        }
    }

    fn process_initial_heartbeat(&mut self, heartbeat: &HEARTBEAT_DATA) {
        let airframe = Airframe::from(heartbeat.mavtype);
        info!("Airframe: {}", airframe);
        self.airframe = Some(airframe);
        self.connected = true;
        self.update_mode(heartbeat);
    }

    fn update_mode(&mut self, heartbeat: &HEARTBEAT_DATA) {
        self.flight_state.armed = is_armed(heartbeat);
        self.flight_state.custom_mode = heartbeat.custom_mode;
    }

    fn update_flight_state(&mut self, hud: &VFR_HUD_DATA) {
        self.flight_state.climb_rate = hud.climb as f64;
        self.flight_state.airspeed = hud.airspeed as f64;
        self.flight_state.groundspeed = hud.groundspeed as f64;
        self.flight_state.throttle = hud.throttle as f64;
    }
}

/// STATUSTEXT text, NUL padded on the wire
fn status_text(text: &STATUSTEXT_DATA) -> String {
    String::from_utf8_lossy(&text.text)
        .trim_end_matches('\0')
        .to_owned()
}

/// A vehicle on the other side of a link
pub struct Vehicle {
    connection: Connection,
    state: VehicleState,
}

impl Vehicle {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            state: VehicleState::new(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    /// Receive one message and apply it to the vehicle state
    pub async fn update(&mut self) -> Result<MavMessage> {
        let message = self.connection.recv_message().await?;
        self.state.update(&message);
        Ok(message)
    }

    /// Receive messages until the first heartbeat has been processed
    pub async fn wait_connected(&mut self) -> Result<()> {
        while !self.state.is_connected() {
            self.update().await?;
        }
        Ok(())
    }

    async fn command(&self, command: MavCmd, params: [f32; 7]) -> Result<()> {
        let command = command_long(
            self.connection.target_system(),
            self.connection.target_component(),
            command,
            0,
            params,
        );
        self.connection
            .send_message(&MavMessage::COMMAND_LONG(command))
            .await
    }

    pub async fn arm(&self) -> Result<()> {
        info!("Arming motors");
        self.command(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
            .await
    }

    pub async fn disarm(&self) -> Result<()> {
        info!("Disarming motors");
        self.command(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, [0.0; 7]).await
    }

    /// Switch to an autopilot specific flight mode, ie. [COPTER_MODE_GUIDED]
    pub async fn set_mode(&self, custom_mode: u32) -> Result<()> {
        let base_mode = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32;
        self.command(
            MavCmd::MAV_CMD_DO_SET_MODE,
            [base_mode, custom_mode as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
        .await
    }

    /// Take off to `altitude` meters above home
    pub async fn takeoff(&self, altitude: f32) -> Result<()> {
        self.command(
            MavCmd::MAV_CMD_NAV_TAKEOFF,
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, altitude],
        )
        .await
    }

    /// Ask for `message_id` to be streamed at `rate_hz`, a rate of 0 or less stops the stream
    pub async fn set_message_interval(&self, message_id: u32, rate_hz: f32) -> Result<()> {
        let interval_us = if rate_hz > 0.0 { 1e6 / rate_hz } else { -1.0 };
        self.command(
            MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
            [message_id as f32, interval_us, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
        .await
    }

    /// Legacy stream request, still the simplest way to get telemetry out of ArduPilot
    pub async fn request_data_stream(&self, stream_id: u8, rate_hz: u16) -> Result<()> {
        let request = REQUEST_DATA_STREAM_DATA {
            req_message_rate: rate_hz,
            target_system: self.connection.target_system(),
            target_component: self.connection.target_component(),
            req_stream_id: stream_id,
            start_stop: 1,
        };
        self.connection
            .send_message(&MavMessage::REQUEST_DATA_STREAM(request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock;
    use crate::message::{command_params, MavAutopilot, MavState, COMMAND_LONG_DATA};
    use mavlink::common::MavSeverity;

    fn heartbeat(armed: bool) -> MavMessage {
        let mut base_mode = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED;
        if armed {
            base_mode |= MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED;
        }
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: COPTER_MODE_GUIDED,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    fn global_position(hdg: u16) -> GLOBAL_POSITION_INT_DATA {
        GLOBAL_POSITION_INT_DATA {
            time_boot_ms: 1000,
            lat: 377_749_000,
            lon: -1_224_194_000,
            alt: 15_500,
            relative_alt: 10_000,
            vx: 0,
            vy: 0,
            vz: 0,
            hdg,
        }
    }

    #[test]
    fn test_messages_ignored_before_heartbeat() {
        let position = MavMessage::GLOBAL_POSITION_INT(global_position(27_000));

        let mut state = VehicleState::new();
        state.update(&position);
        assert!(!state.is_connected());
        assert!(state.position().is_none());

        state.update(&heartbeat(false));
        assert!(state.is_connected());
        assert_eq!(state.airframe(), Some(Airframe::Quadrotor));

        state.update(&position);
        let position = state.position().unwrap();
        assert!((position.latitude - 37.7749).abs() < 1e-9);
        assert!((position.longitude + 122.4194).abs() < 1e-9);
        assert_eq!(position.altitude_relative, 10.0);
        assert_eq!(position.altitude_amsl, 15.5);
        assert_eq!(position.heading, Some(270.0));
    }

    #[test]
    fn test_armed_and_hud() {
        let mut state = VehicleState::new();
        state.update(&heartbeat(false));
        assert!(!state.flight_state().armed);

        state.update(&heartbeat(true));
        state.update(&MavMessage::VFR_HUD(VFR_HUD_DATA {
            airspeed: 1.5,
            groundspeed: 2.0,
            alt: 10.0,
            climb: 0.5,
            heading: 270,
            throttle: 42,
        }));

        let flight_state = state.flight_state();
        assert!(flight_state.armed);
        assert_eq!(flight_state.custom_mode, COPTER_MODE_GUIDED);
        assert_eq!(flight_state.airspeed, 1.5);
        assert_eq!(flight_state.groundspeed, 2.0);
        assert_eq!(flight_state.climb_rate, 0.5);
        assert_eq!(flight_state.throttle, 42.0);
    }

    #[test]
    fn test_status_text_padding() {
        let mut text = [0u8; 50];
        text[..16].copy_from_slice(b"Takeoff complete");
        let status = STATUSTEXT_DATA {
            severity: MavSeverity::MAV_SEVERITY_INFO,
            text,
            id: 0,
            chunk_seq: 0,
        };
        assert_eq!(status_text(&status), "Takeoff complete");
    }

    #[test]
    fn test_unknown_heading() {
        assert_eq!(Position::from(&global_position(u16::MAX)).heading, None);
        assert_eq!(Position::from(&global_position(0)).heading, Some(0.0));
    }

    #[test]
    fn test_airframe_display() {
        assert_eq!(
            Airframe::from(MavType::MAV_TYPE_FIXED_WING).to_string(),
            "FIXED WING"
        );
        assert_eq!(
            Airframe::from(MavType::MAV_TYPE_QUADROTOR).to_string(),
            "QUADROTOR"
        );
        let airframe = Airframe::from(MavType::MAV_TYPE_ANTENNA_TRACKER);
        assert_eq!(airframe, Airframe::Unknown(MavType::MAV_TYPE_ANTENNA_TRACKER));
        assert_eq!(airframe.to_string(), "UNKNOWN");
    }

    async fn connected_vehicle() -> (Vehicle, flume::Receiver<Vec<u8>>) {
        let (connection, incoming, outgoing) = mock::connection();
        incoming.send(mock::frame(1, 1, &heartbeat(false))).unwrap();

        let mut vehicle = Vehicle::new(connection);
        vehicle.wait_connected().await.unwrap();
        (vehicle, outgoing)
    }

    fn sent_command(outgoing: &flume::Receiver<Vec<u8>>) -> COMMAND_LONG_DATA {
        match mock::sent(outgoing) {
            (_, MavMessage::COMMAND_LONG(command)) => command,
            (_, other) => panic!("Unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_arm_and_takeoff() {
        let (vehicle, outgoing) = connected_vehicle().await;
        assert_eq!(vehicle.state().airframe(), Some(Airframe::Quadrotor));

        vehicle.arm().await.unwrap();
        let command = sent_command(&outgoing);
        assert_eq!(command.command, MavCmd::MAV_CMD_COMPONENT_ARM_DISARM);
        assert_eq!(command.param1, 1.0);
        assert_eq!((command.target_system, command.target_component), (1, 1));

        vehicle.takeoff(10.0).await.unwrap();
        let command = sent_command(&outgoing);
        assert_eq!(command.command, MavCmd::MAV_CMD_NAV_TAKEOFF);
        assert_eq!(
            command_params(&command),
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0]
        );
    }

    #[tokio::test]
    async fn test_set_mode_and_intervals() {
        let (vehicle, outgoing) = connected_vehicle().await;

        vehicle.set_mode(COPTER_MODE_GUIDED).await.unwrap();
        let command = sent_command(&outgoing);
        assert_eq!(command.command, MavCmd::MAV_CMD_DO_SET_MODE);
        assert_eq!(command.param1, 1.0);
        assert_eq!(command.param2, 4.0);

        vehicle.set_message_interval(33, 4.0).await.unwrap();
        let command = sent_command(&outgoing);
        assert_eq!(command.command, MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL);
        assert_eq!(command.param1, 33.0);
        assert_eq!(command.param2, 250_000.0);

        vehicle.request_data_stream(0, 5).await.unwrap();
        let (_, message) = mock::sent(&outgoing);
        assert_eq!(
            message,
            MavMessage::REQUEST_DATA_STREAM(REQUEST_DATA_STREAM_DATA {
                req_message_rate: 5,
                target_system: 1,
                target_component: 1,
                req_stream_id: 0,
                start_stop: 1,
            })
        );
    }
}
