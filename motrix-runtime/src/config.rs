// Copyright (C) 2026 Motrix Robotics
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::path::PathBuf;

use crate::bus::Bus;
use crate::{consts, Error, Result};

/// Motrix runtime configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Bus adapter settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// Drive unit settings.
    #[serde(default = "default_drive")]
    pub drive: UnitConfig,

    /// Actuator unit settings.
    #[serde(default = "default_actuator")]
    pub actuator: UnitConfig,

    /// Telemetry uplink settings.
    #[serde(default)]
    pub uplink: UplinkConfig,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct BusConfig {
    /// Adapter device node. Unset means simulation mode.
    pub device: Option<PathBuf>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct UnitConfig {
    /// Bus address of the unit.
    pub address: u16,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct UplinkConfig {
    /// Uplink bridge hostname or ip address.
    pub host: String,

    /// Uplink bridge TCP port.
    #[serde(default = "default_uplink_port")]
    pub port: u16,
}

fn default_drive() -> UnitConfig {
    UnitConfig {
        address: consts::DRIVE_ADDRESS,
    }
}

fn default_actuator() -> UnitConfig {
    UnitConfig {
        address: consts::ACTUATOR_ADDRESS,
    }
}

fn default_uplink_port() -> u16 {
    consts::UPLINK_PORT
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: consts::UPLINK_PORT,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            drive: default_drive(),
            actuator: default_actuator(),
            uplink: UplinkConfig::default(),
        }
    }
}

impl Config {
    /// Read configuration from the first path that exists.
    ///
    /// Falls back to the built-in defaults when none of the paths
    /// exist. A file that exists but does not parse is an error.
    pub fn try_from_file(paths: Vec<&str>) -> Result<Self> {
        for path in paths {
            let path = std::path::Path::new(path);
            if !path.exists() {
                continue;
            }

            let contents = std::fs::read_to_string(path)?;
            return toml::from_str(&contents).map_err(Error::Config);
        }

        debug!("No configuration file found, using defaults");

        Ok(Self::default())
    }

    /// Open the configured bus, or a simulated bus without a device.
    pub fn open_bus(&self) -> Result<Bus> {
        match &self.bus.device {
            Some(device) => Bus::open(device),
            None => {
                info!("Running without bus adapter");
                Ok(Bus::simulated())
            }
        }
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bus: {}; drive: {:#04x}; actuator: {:#04x}; uplink: {}:{}",
            self.bus
                .device
                .as_ref()
                .map(|device| device.display().to_string())
                .unwrap_or_else(|| "simulated".to_string()),
            self.drive.address,
            self.actuator.address,
            self.uplink.host,
            self.uplink.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();

        assert!(config.bus.device.is_none());
        assert_eq!(config.drive.address, 0x69);
        assert_eq!(config.actuator.address, 0x68);
        assert_eq!(config.uplink.port, 1337);
    }

    #[test]
    fn parse_partial_file() {
        let config: Config = toml::from_str(
            r#"
            [bus]
            device = "/dev/i2c-1"

            [uplink]
            host = "10.0.0.2"
            "#,
        )
        .unwrap();

        assert_eq!(config.bus.device, Some(PathBuf::from("/dev/i2c-1")));
        assert_eq!(config.uplink.host, "10.0.0.2");
        assert_eq!(config.uplink.port, 1337);
        assert_eq!(config.drive.address, 0x69);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::try_from_file(vec!["/etc/motrix/does-not-exist.toml"]).unwrap();

        assert!(config.bus.device.is_none());
    }
}
