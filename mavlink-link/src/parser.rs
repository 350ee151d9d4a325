use crate::error::{Error, Result};
use crate::message::{MavHeader, MavMessage, MavlinkVersion};
use mavlink::peek_reader::PeekReader;
use std::io::Cursor;

const MAV_STX_V1: u8 = 0xFE;
const MAV_STX_V2: u8 = 0xFD;

const V1_HEADER_LEN: usize = 6;
const V2_HEADER_LEN: usize = 10;
const CHECKSUM_LEN: usize = 2;
const SIGNATURE_LEN: usize = 13;

const MAVLINK_IFLAG_SIGNED: u8 = 0x01;

/// Serialize a message into one wire frame
pub fn serialize(
    version: MavlinkVersion,
    header: MavHeader,
    message: &MavMessage,
) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::with_capacity(280));
    mavlink::write_versioned_msg(&mut buf, version, header, message)?;
    Ok(buf.into_inner())
}

/// Incremental parser turning a byte stream (datagrams, a TCP stream or a
/// serial port) into messages.
///
/// Frame boundaries are found from the frame header, decoding and checksum
/// verification are done by the mavlink crate. Both protocol versions are
/// accepted, MAVLink 2 signatures are skipped and not verified.
#[derive(Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes waiting for a complete frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Extract the next message.
    ///
    /// Returns `None` when more bytes are needed. Bytes preceding a start marker
    /// are discarded. A frame that does not decode only consumes its start
    /// marker so that the parser can resynchronise on the following bytes.
    pub fn next_message(&mut self) -> Option<Result<(MavHeader, MavMessage)>> {
        let start = self
            .buffer
            .iter()
            .position(|b| *b == MAV_STX_V1 || *b == MAV_STX_V2);
        match start {
            Some(start) => {
                self.buffer.drain(..start);
            }
            None => {
                self.buffer.clear();
                return None;
            }
        }

        if self.buffer.len() < 3 {
            return None;
        }
        let (version, header_len) = if self.buffer[0] == MAV_STX_V1 {
            (MavlinkVersion::V1, V1_HEADER_LEN)
        } else {
            (MavlinkVersion::V2, V2_HEADER_LEN)
        };
        let signed = version == MavlinkVersion::V2 && self.buffer[2] & MAVLINK_IFLAG_SIGNED != 0;
        let frame_len = header_len
            + self.buffer[1] as usize
            + CHECKSUM_LEN
            + if signed { SIGNATURE_LEN } else { 0 };
        if self.buffer.len() < frame_len {
            return None;
        }

        match parse_frame(version, &self.buffer[..frame_len]) {
            Ok(message) => {
                self.buffer.drain(..frame_len);
                Some(Ok(message))
            }
            Err(e) => {
                self.buffer.drain(..1);
                Some(Err(e))
            }
        }
    }
}

fn parse_frame(version: MavlinkVersion, frame: &[u8]) -> Result<(MavHeader, MavMessage)> {
    let mut reader = PeekReader::new(Cursor::new(frame));
    let (header, message) = mavlink::read_versioned_msg::<MavMessage, _>(&mut reader, version)?;

    // The reader skips corrupted bytes on its own, only accept the frame starting at the marker
    let (sequence, system_id, component_id) = match version {
        MavlinkVersion::V1 => (frame[2], frame[3], frame[4]),
        MavlinkVersion::V2 => (frame[4], frame[5], frame[6]),
    };
    if (header.sequence, header.system_id, header.component_id)
        != (sequence, system_id, component_id)
    {
        return Err(Error::InvalidFrame);
    }

    Ok((header, message))
}
