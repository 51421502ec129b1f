// Copyright (C) 2026 Motrix Robotics
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::{error, fmt};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The bus transaction itself failed.
    ///
    /// Transport faults are never retried by the runtime. The caller
    /// decides whether the operation is worth repeating.
    Bus(motrix_i2c::Error),

    /// An I/O error outside the bus transport.
    Io(std::io::Error),

    /// Could not parse the configuration file.
    Config(toml::de::Error),

    /// A telemetry payload was shorter than its channel format.
    ShortPacket {
        channel: u8,
        expected: usize,
        actual: usize,
    },

    /// The unit has no telemetry channel with this index.
    UnknownChannel(u8),

    /// The unit has no PID loop with this index.
    UnknownPid(u8),

    /// One or multiple parameters were incorrect.
    InvalidInput,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus transport: {}", e),
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Config(e) => write!(f, "configuration: {}", e),
            Error::ShortPacket {
                channel,
                expected,
                actual,
            } => write!(
                f,
                "short packet on channel {}: expected {} bytes, got {}",
                channel, expected, actual
            ),
            Error::UnknownChannel(index) => write!(f, "no telemetry channel {}", index),
            Error::UnknownPid(index) => write!(f, "no pid loop {}", index),
            Error::InvalidInput => write!(f, "invalid parameters"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Bus(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<motrix_i2c::Error> for Error {
    fn from(error: motrix_i2c::Error) -> Self {
        Error::Bus(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}
