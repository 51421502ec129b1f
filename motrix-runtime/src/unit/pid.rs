// Copyright (C) 2026 Motrix Robotics
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use bytes::{Buf, BufMut, BytesMut};

/// Gains of one control loop on a drive unit.
///
/// The gains live on the unit; this is the host-side shadow, refreshed
/// on every get and pushed on every set.
#[derive(Debug, Clone, PartialEq)]
pub struct Pid {
    name: &'static str,
    index: u8,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Pid {
    /// Wire size of the gain triple.
    pub const WIRE_SIZE: usize = 12;

    pub fn new(name: &'static str, index: u8) -> Self {
        Self {
            name,
            index,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn set_gains(&mut self, kp: f32, ki: f32, kd: f32) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::WIRE_SIZE);
        buf.put_f32_le(self.kp);
        buf.put_f32_le(self.ki);
        buf.put_f32_le(self.kd);
        buf.to_vec()
    }

    pub(crate) fn update_from_wire(&mut self, data: &[u8]) {
        debug_assert!(data.len() >= Self::WIRE_SIZE);

        let mut buf = data;
        self.kp = buf.get_f32_le();
        self.ki = buf.get_f32_le();
        self.kd = buf.get_f32_le();
    }
}

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: kp: {:.4} ki: {:.4} kd: {:.4}",
            self.name, self.kp, self.ki, self.kd
        )
    }
}
