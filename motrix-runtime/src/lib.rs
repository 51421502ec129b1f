// Copyright (C) 2026 Motrix Robotics
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

//! The `motrix` library turns the machine's controller units into a
//! safe command/response API for application code.
//!
//! Units sit on a shared I2C bus and expose a fixed register space.
//! The [`bus`] module serializes transactions on that bus, the
//! [`unit`] module layers the blocking and emergency stop discipline
//! on top, and the [`telemetry`] module describes the sample streams
//! the units produce. The streaming side of telemetry lives in the
//! re-exported [`uplink`] crate.
//!
//! Application code builds units against one [`bus::Bus`] handle,
//! starts them, and issues commands from as many threads as it likes;
//! transactions are serialized per bus, command ordering on a single
//! unit is the caller's business.

pub mod bus;
pub mod geometry;
pub mod telemetry;
pub mod unit;

#[macro_use]
extern crate log;

mod config;
mod error;

pub use self::config::*;
pub use self::error::{Error, Result};

pub use motrix_uplink as uplink;

/// Motrix runtime module containing various constants.
pub mod consts {
    /// Motrix runtime version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Default bus address of the drive unit.
    pub const DRIVE_ADDRESS: u16 = 0x69;

    /// Default bus address of the actuator unit.
    pub const ACTUATOR_ADDRESS: u16 = 0x68;

    /// Default TCP port of the telemetry uplink bridge.
    pub const UPLINK_PORT: u16 = 1337;

    /// Completion poll rate in hertz.
    ///
    /// The bus offers no asynchronous notification, so command
    /// completion is observed by polling the ready register at this
    /// rate.
    pub const POLL_RATE: u32 = 30;
}
