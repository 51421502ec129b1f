// Copyright (C) 2026 Motrix Robotics
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use bytes::Buf;

use crate::{Error, Result};

/// Numeric type of one field in a telemetry packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    F32,
    U32,
}

impl FieldType {
    /// Wire width in bytes.
    pub const fn width(self) -> usize {
        match self {
            FieldType::F32 => 4,
            FieldType::U32 => 4,
        }
    }
}

/// One typed field in a packet shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
}

impl Field {
    const fn f32(name: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::F32,
        }
    }
}

/// Every packet shape starts with the unit-local timestamp.
const BASE_FIELDS: &[Field] = &[Field::f32("timestamp")];

/// Kind of samples a channel produces.
///
/// The kind contributes its own fields on top of the base fields;
/// the full shape of a channel is the concatenation of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Controller loop trace: setpoint, measured input, output.
    Pid,
    /// Supply rail sample: voltage, current, power.
    Power,
}

impl ChannelKind {
    fn fields(&self) -> &'static [Field] {
        const PID_FIELDS: &[Field] = &[
            Field::f32("setpoint"),
            Field::f32("measured"),
            Field::f32("output"),
        ];
        const POWER_FIELDS: &[Field] = &[
            Field::f32("voltage"),
            Field::f32("current"),
            Field::f32("power"),
        ];
        match self {
            ChannelKind::Pid => PID_FIELDS,
            ChannelKind::Power => POWER_FIELDS,
        }
    }
}

/// Ring buffer occupancy as reported by the unit.
#[derive(Debug, Clone, Copy)]
pub struct ChannelInfo {
    /// Number of buffered samples left on the unit.
    pub remaining: u32,
    /// Packet size as the unit reports it, for diagnostics.
    pub packet_size: u32,
}

/// One decoded telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryPacket {
    pub timestamp: f32,
    pub data: PacketData,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PacketData {
    Pid {
        setpoint: f32,
        measured: f32,
        output: f32,
    },
    Power {
        voltage: f32,
        current: f32,
        power: f32,
    },
}

impl std::fmt::Display for TelemetryPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.data {
            PacketData::Pid {
                setpoint,
                measured,
                output,
            } => write!(
                f,
                "[{:9.3}] setpoint: {:.3} measured: {:.3} output: {:.3}",
                self.timestamp, setpoint, measured, output
            ),
            PacketData::Power {
                voltage,
                current,
                power,
            } => write!(
                f,
                "[{:9.3}] voltage: {:.2}V current: {:.2}A power: {:.2}W",
                self.timestamp, voltage, current, power
            ),
        }
    }
}

/// A named, indexed telemetry channel on a unit.
///
/// The wire format is derived once at construction by walking the
/// packet shape base first, then the kind fields. All fields use the
/// bus byte order (little-endian).
#[derive(Debug, Clone)]
pub struct Channel {
    name: String,
    index: u8,
    kind: ChannelKind,
    fields: Vec<Field>,
    size: usize,
    enabled: bool,
    downsample: u8,
}

impl Channel {
    pub fn new(name: impl ToString, index: u8, kind: ChannelKind) -> Self {
        let fields: Vec<Field> = BASE_FIELDS
            .iter()
            .chain(kind.fields().iter())
            .copied()
            .collect();
        let size = fields.iter().map(|field| field.ty.width()).sum();

        Self {
            name: name.to_string(),
            index,
            kind,
            fields,
            size,
            enabled: false,
            downsample: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Full packet shape, timestamp first.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Packet wire size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn downsample(&self) -> u8 {
        self.downsample
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_downsample(&mut self, factor: u8) {
        self.downsample = factor;
    }

    /// Decode a raw payload against this channel's shape.
    pub fn decode(&self, payload: &[u8]) -> Result<TelemetryPacket> {
        if payload.len() < self.size {
            return Err(Error::ShortPacket {
                channel: self.index,
                expected: self.size,
                actual: payload.len(),
            });
        }

        let mut buf = payload;
        let timestamp = buf.get_f32_le();

        let data = match self.kind {
            ChannelKind::Pid => PacketData::Pid {
                setpoint: buf.get_f32_le(),
                measured: buf.get_f32_le(),
                output: buf.get_f32_le(),
            },
            ChannelKind::Power => PacketData::Power {
                voltage: buf.get_f32_le(),
                current: buf.get_f32_le(),
                power: buf.get_f32_le(),
            },
        };

        Ok(TelemetryPacket { timestamp, data })
    }
}
