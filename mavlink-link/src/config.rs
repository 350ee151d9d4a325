use crate::error::{Error, Result};
use crate::message::MavlinkVersion;
use url::Url;

/// Link parameters shared by every connection opened from a [LinkContext](crate::LinkContext)
///
/// Each value can be overridden per link from the URI query, for example
/// `udpin://0.0.0.0:14550?source_system=254&version=2&queue_size=100`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkConfig {
    /// System id stamped on outgoing frames (255 is the usual ground station id)
    pub source_system: u8,
    /// Component id stamped on outgoing frames
    pub source_component: u8,
    /// Protocol version of outgoing frames; both versions are always accepted on receive
    pub version: MavlinkVersion,
    /// Depth of the uplink and downlink queues of a connection task. When nobody
    /// reads the link, the oldest received data is dropped.
    pub queue_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            source_system: 255,
            source_component: 0,
            version: MavlinkVersion::V1,
            queue_size: 1000,
        }
    }
}

impl LinkConfig {
    /// Copy of the config with the URI query pairs applied
    pub(crate) fn with_query(&self, uri: &Url) -> Result<LinkConfig> {
        let mut config = self.clone();

        for (key, value) in uri.query_pairs() {
            match key.as_ref() {
                "source_system" => config.source_system = value.parse()?,
                "source_component" => config.source_component = value.parse()?,
                "version" => {
                    config.version = match value.as_ref() {
                        "1" => MavlinkVersion::V1,
                        "2" => MavlinkVersion::V2,
                        _ => return Err(Error::InvalidUri),
                    }
                }
                "queue_size" => {
                    config.queue_size = match value.parse::<usize>()? {
                        0 => return Err(Error::InvalidUri),
                        size => size,
                    }
                }
                // Transport specific, ie. `baud`
                _ => continue,
            };
        }

        Ok(config)
    }
}
