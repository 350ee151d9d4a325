//! Message helpers over the `common` dialect of the mavlink crate

pub use mavlink::common::{
    MavAutopilot, MavCmd, MavMessage, MavModeFlag, MavResult, MavState, MavType,
    COMMAND_ACK_DATA, COMMAND_LONG_DATA, GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA,
    REQUEST_DATA_STREAM_DATA, STATUSTEXT_DATA, VFR_HUD_DATA,
};
pub use mavlink::{MavHeader, MavlinkVersion};
use mavlink::Message;

/// MAVLink version advertised in heartbeats
pub const MAVLINK_VERSION: u8 = 3;

/// Heartbeat announcing a ground control station
pub fn gcs_heartbeat() -> HEARTBEAT_DATA {
    HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: MAVLINK_VERSION,
    }
}

/// True if the heartbeat comes from a flight controller.
///
/// Ground stations and components without an autopilot (gimbals, cameras,
/// ADSB receivers...) also send heartbeats, they are never link targets.
pub fn is_vehicle_heartbeat(heartbeat: &HEARTBEAT_DATA) -> bool {
    heartbeat.mavtype != MavType::MAV_TYPE_GCS
        && heartbeat.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID
}

pub fn is_armed(heartbeat: &HEARTBEAT_DATA) -> bool {
    heartbeat
        .base_mode
        .contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED)
}

/// Build a COMMAND_LONG from its seven float parameters
pub fn command_long(
    target_system: u8,
    target_component: u8,
    command: MavCmd,
    confirmation: u8,
    params: [f32; 7],
) -> COMMAND_LONG_DATA {
    COMMAND_LONG_DATA {
        param1: params[0],
        param2: params[1],
        param3: params[2],
        param4: params[3],
        param5: params[4],
        param6: params[5],
        param7: params[6],
        command,
        target_system,
        target_component,
        confirmation,
    }
}

/// The seven parameters of a COMMAND_LONG, in order
pub fn command_params(command: &COMMAND_LONG_DATA) -> [f32; 7] {
    [
        command.param1,
        command.param2,
        command.param3,
        command.param4,
        command.param5,
        command.param6,
        command.param7,
    ]
}

/// Name of the message, ie. `"HEARTBEAT"`, as used to key received messages
pub fn message_name(message: &MavMessage) -> &'static str {
    message.message_name()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(mavtype: MavType, autopilot: MavAutopilot) -> HEARTBEAT_DATA {
        HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype,
            autopilot,
            base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            system_status: MavState::MAV_STATE_STANDBY,
            mavlink_version: MAVLINK_VERSION,
        }
    }

    #[test]
    fn test_vehicle_heartbeat() {
        assert!(is_vehicle_heartbeat(&heartbeat(
            MavType::MAV_TYPE_QUADROTOR,
            MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA
        )));
        assert!(!is_vehicle_heartbeat(&gcs_heartbeat()));
        assert!(!is_vehicle_heartbeat(&heartbeat(
            MavType::MAV_TYPE_GIMBAL,
            MavAutopilot::MAV_AUTOPILOT_INVALID
        )));
        assert!(!is_vehicle_heartbeat(&heartbeat(
            MavType::MAV_TYPE_ADSB,
            MavAutopilot::MAV_AUTOPILOT_INVALID
        )));
    }

    #[test]
    fn test_is_armed() {
        let mut hb = heartbeat(
            MavType::MAV_TYPE_QUADROTOR,
            MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
        );
        assert!(!is_armed(&hb));
        hb.base_mode |= MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED;
        assert!(is_armed(&hb));
    }

    #[test]
    fn test_command_long_params() {
        let params = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let command = command_long(1, 2, MavCmd::MAV_CMD_NAV_TAKEOFF, 0, params);
        assert_eq!(command.param1, 1.0);
        assert_eq!(command.param7, 7.0);
        assert_eq!((command.target_system, command.target_component), (1, 2));
        assert_eq!(command_params(&command), params);
    }

    #[test]
    fn test_message_name() {
        assert_eq!(
            message_name(&MavMessage::HEARTBEAT(gcs_heartbeat())),
            "HEARTBEAT"
        );
        let takeoff = command_long(1, 1, MavCmd::MAV_CMD_NAV_TAKEOFF, 0, [0.0; 7]);
        assert_eq!(message_name(&MavMessage::COMMAND_LONG(takeoff)), "COMMAND_LONG");
    }
}
