//! # MAVLink Link
//!
//! This Crate implements a ground station side MAVLink link to an autopilot.
//! It opens a connection over UDP, TCP or a serial port, keeps track of the
//! vehicle on the other side of the link and of the last message received of
//! each type, and sends commands to it.
//!
//! The entry point to this Crate is the [LinkContext], it holds the link
//! configuration and provides functions to open a link [Connection].
//!
//! Each connection runs its transport in a tokio task, so a tokio runtime must be
//! running when a link is opened.
//!
//! Example:
//!
//! ``` no_run
//! # use std::error::Error;
//! # async fn test() -> Result<(), Box<dyn Error>> {
//! // Create a link Context
//! let context = mavlink_link::LinkContext::new();
//!
//! // Listen for the vehicle
//! let connection = context.open_link("udpin://127.0.0.1:14550").await?;
//!
//! connection.wait_heartbeat().await?;
//! println!("Vehicle is system {}", connection.target_system());
//!
//! connection.send_takeoff(0, [0.0; 7]).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod context;
mod error;
mod message;
mod parser;
#[cfg(feature = "serial")]
mod serial_connection;
#[cfg(feature = "tcp")]
mod tcp_connection;
#[cfg(feature = "udp")]
mod udp_connection;
pub mod vehicle;

pub use config::LinkConfig;
pub use connection::{Connection, ConnectionStatus, ConnectionTrait};
pub use context::LinkContext;
pub use error::{Error, Result};
pub use mavlink;
pub use message::*;
pub use parser::{serialize, FrameParser};
pub use vehicle::Vehicle;
