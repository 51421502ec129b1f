// Copyright (C) 2026 Motrix Robotics
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use bytes::{Buf, BufMut, BytesMut};
use nalgebra::Point2;

use super::{reg, Pid, Unit, UnitCore, REG_RUN};
use crate::bus::Bus;
use crate::geometry::shortest_rotation;
use crate::telemetry::{Channel, ChannelKind};
use crate::{Error, Result};

const REG_MOVE: u8 = 0x01;
const REG_PID_GET: u8 = 0x02;
const REG_POSITION: u8 = 0x03;
const REG_PID_SET: u8 = 0x05;
const REG_DEBUG: u8 = 0x0b;
const REG_PROFILE_GET: u8 = 0x0c;
const REG_PROFILE_SET: u8 = 0x0d;
const REG_BATTERY: u8 = 0x0e;

/// Sub-opcode of `REG_RUN` for the immediate stop.
const RUN_ESTOP: u8 = 1;

const POSITION_POLAR: u8 = 0;
const POSITION_XY: u8 = 1;

const PROFILE_LINEAR: u8 = 0;
const PROFILE_ANGULAR: u8 = 1;

const DEBUG_ENCODERS: u8 = 0;
const DEBUG_MOTORS: u8 = 1;
const DEBUG_TARGET: u8 = 2;
const DEBUG_MOTORS_ENABLE: u8 = 3;
const DEBUG_CONTROLLER_STATE: u8 = 4;
const DEBUG_LEFT_STATS: u8 = 5;
const DEBUG_RIGHT_STATS: u8 = 6;
const DEBUG_EFFECTS: u8 = 7;
const DEBUG_RGB: u8 = 8;
const DEBUG_POPUP: u8 = 9;
const DEBUG_LIGHT_SENSORS: u8 = 10;

/// Control loops of the drive unit, by channel/loop index.
const PID_LOOPS: [(u8, &str); 4] = [(0, "theta"), (1, "rho"), (2, "left_vel"), (3, "right_vel")];

/// Telemetry channel of the power rail sampler.
const POWER_CHANNEL: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkerState {
    Off = 0,
    Left = 1,
    Right = 2,
    Warning = 3,
    Estop = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlightState {
    Off = 0,
    Dim = 1,
    Full = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightProgram {
    Off = 0,
    Automatic = 1,
    Manual = 2,
    Party = 3,
    Police = 4,
    Show = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingState {
    Off = 0,
    Rainbow = 1,
    Speed = 2,
    Chase = 3,
    Wiper = 4,
    Battery = 5,
}

/// Lighting and effects state pushed in one debug write.
#[derive(Debug, Clone, Copy)]
pub struct LightEffects {
    pub program: LightProgram,
    pub blinker: BlinkerState,
    pub headlight: HeadlightState,
    pub ring: RingState,
    pub stop: bool,
    pub center_stop: bool,
    pub disco: bool,
    pub reverse: bool,
    pub smoke: bool,
    pub popup_left: f32,
    pub popup_right: f32,
}

impl Default for LightEffects {
    fn default() -> Self {
        Self {
            program: LightProgram::Off,
            blinker: BlinkerState::Off,
            headlight: HeadlightState::Off,
            ring: RingState::Off,
            stop: false,
            center_stop: false,
            disco: false,
            reverse: false,
            smoke: false,
            popup_left: 0.0,
            popup_right: 0.0,
        }
    }
}

impl LightEffects {
    fn to_bytes(self) -> Vec<u8> {
        let flags = self.stop as u8
            | (self.center_stop as u8) << 1
            | (self.disco as u8) << 2
            | (self.reverse as u8) << 3
            | (self.smoke as u8) << 4;

        let mut buf = BytesMut::with_capacity(13);
        buf.put_u8(flags);
        buf.put_u8(self.program as u8);
        buf.put_u8(self.blinker as u8);
        buf.put_u8(self.headlight as u8);
        buf.put_u8(self.ring as u8);
        buf.put_f32_le(self.popup_left);
        buf.put_f32_le(self.popup_right);
        buf.to_vec()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatteryStats {
    pub voltage: f32,
    pub current: f32,
    pub power: f32,
    pub charge: f32,
}

/// The motion controller unit.
///
/// Owns the machine's differential drive: odometry, the distance and
/// heading control loops, speed profiles and the drivetrain debug
/// registers. Distances are millimeters, angles radians.
pub struct Drive {
    core: UnitCore,
    pids: Mutex<BTreeMap<u8, Pid>>,
}

impl Drive {
    /// Bind a drive unit and bring the host shadow in sync.
    ///
    /// Leaves the unit stopped, reads back the gains of every control
    /// loop and disables all telemetry channels so a rebooted host
    /// starts from a known state.
    pub fn new(bus: Arc<Bus>, address: u16) -> Result<Self> {
        let drive = Self {
            core: UnitCore::new(bus, address),
            pids: Mutex::new(BTreeMap::new()),
        };

        drive.stop()?;

        for (index, name) in PID_LOOPS {
            let mut pid = Pid::new(name, index);
            let data = drive
                .core
                .read_register(reg(REG_PID_GET, index), Pid::WIRE_SIZE)?;
            pid.update_from_wire(&data);
            drive.pids.lock().unwrap().insert(index, pid);

            drive
                .core
                .register_channel(Channel::new(format!("pid_{}", name), index, ChannelKind::Pid));
        }
        drive
            .core
            .register_channel(Channel::new("power", POWER_CHANNEL, ChannelKind::Power));

        let indices: Vec<u8> = drive.channels().iter().map(|c| c.index()).collect();
        for index in indices {
            drive.set_channel_enabled(index, false)?;
        }

        Ok(drive)
    }

    /// Current pose as traveled distance and heading.
    pub fn position(&self) -> Result<(f32, f32)> {
        let data = self
            .core
            .read_register(reg(REG_POSITION, POSITION_POLAR), 8)?;
        let mut buf = &data[..];
        Ok((buf.get_f32_le(), buf.get_f32_le()))
    }

    /// Current pose in table coordinates.
    pub fn position_xy(&self) -> Result<(f32, f32)> {
        let data = self.core.read_register(reg(REG_POSITION, POSITION_XY), 8)?;
        let mut buf = &data[..];
        Ok((buf.get_f32_le(), buf.get_f32_le()))
    }

    /// Drive `distance` while rotating `angle`.
    ///
    /// Stoppable: when an emergency stop lands mid-move the unit
    /// brakes on the spot and this call holds for clearance, then
    /// reissues the motion that is still outstanding. The remainder
    /// is the request minus the displacement measured across the
    /// stop, and a component requested as exactly zero stays zero, so
    /// a pure translation never picks up a parasitic rotation from
    /// braking drift.
    pub fn move_by(&self, distance: f32, angle: f32, blocking: Option<bool>) -> Result<()> {
        let blocking = blocking.unwrap_or_else(|| self.is_blocking());
        let mut distance = distance;
        let mut angle = angle;

        loop {
            self.core.gate().wait();

            let origin = self.position()?;

            let mut payload = BytesMut::with_capacity(8);
            payload.put_f32_le(distance);
            payload.put_f32_le(angle);
            self.core.write_register(REG_MOVE, &payload[..])?;

            if self.core.bus().is_simulated() {
                return Ok(());
            }
            if blocking {
                self.core.wait_completed()?;
            }
            if self.core.gate().is_open() {
                return Ok(());
            }

            self.core.gate().wait();

            let resumed = self.position()?;
            if distance != 0.0 {
                distance -= resumed.0 - origin.0;
            }
            if angle != 0.0 {
                angle -= resumed.1 - origin.1;
            }

            debug!(
                "Drive {:#04x}: resume move, {:.2}mm {:.2}rad left",
                self.core.address(),
                distance,
                angle
            );
        }
    }

    /// Move to a point in table coordinates.
    ///
    /// Decomposed into the shortest turn towards the target followed
    /// by a straight drive, issued as one relative move.
    pub fn move_to(&self, x: f32, y: f32) -> Result<()> {
        let (_, theta) = self.position()?;
        let (cx, cy) = self.position_xy()?;

        let delta = Point2::new(x, y) - Point2::new(cx, cy);
        let rotation = shortest_rotation(delta.y.atan2(delta.x) - theta);

        self.move_by(delta.norm(), rotation, None)
    }

    /// Brake immediately, discarding the current motion target.
    pub fn emergency_stop(&self) -> Result<()> {
        self.core.write_register(reg(REG_RUN, RUN_ESTOP), &[])
    }

    /// Read the gains of one control loop from the unit.
    pub fn pid(&self, index: u8) -> Result<Pid> {
        if !self.pids.lock().unwrap().contains_key(&index) {
            return Err(Error::UnknownPid(index));
        }

        let data = self
            .core
            .read_register(reg(REG_PID_GET, index), Pid::WIRE_SIZE)?;

        let mut pids = self.pids.lock().unwrap();
        let pid = pids.get_mut(&index).ok_or(Error::UnknownPid(index))?;
        pid.update_from_wire(&data);
        Ok(pid.clone())
    }

    /// Push new gains for one control loop.
    pub fn set_pid(&self, index: u8, kp: f32, ki: f32, kd: f32) -> Result<Pid> {
        let bytes = {
            let mut pids = self.pids.lock().unwrap();
            let pid = pids.get_mut(&index).ok_or(Error::UnknownPid(index))?;
            pid.set_gains(kp, ki, kd);
            pid.to_bytes()
        };

        self.core.write_register(reg(REG_PID_SET, index), &bytes)?;

        Ok(self.pids.lock().unwrap()[&index].clone())
    }

    /// Last known gains, by loop name.
    pub fn pid_by_name(&self, name: &str) -> Option<Pid> {
        self.pids
            .lock()
            .unwrap()
            .values()
            .find(|pid| pid.name() == name)
            .cloned()
    }

    /// Last known gains of every loop, ordered by index.
    pub fn pids(&self) -> Vec<Pid> {
        self.pids.lock().unwrap().values().cloned().collect()
    }

    /// Linear velocity and acceleration limits.
    pub fn linear_speed_profile(&self) -> Result<(f32, f32)> {
        self.speed_profile(PROFILE_LINEAR)
    }

    /// Angular velocity and acceleration limits.
    pub fn angular_speed_profile(&self) -> Result<(f32, f32)> {
        self.speed_profile(PROFILE_ANGULAR)
    }

    pub fn set_linear_speed_profile(&self, vmax: f32, amax: f32) -> Result<()> {
        self.set_speed_profile(PROFILE_LINEAR, vmax, amax)
    }

    pub fn set_angular_speed_profile(&self, vmax: f32, amax: f32) -> Result<()> {
        self.set_speed_profile(PROFILE_ANGULAR, vmax, amax)
    }

    fn speed_profile(&self, axis: u8) -> Result<(f32, f32)> {
        let data = self.core.read_register(reg(REG_PROFILE_GET, axis), 8)?;
        let mut buf = &data[..];
        Ok((buf.get_f32_le(), buf.get_f32_le()))
    }

    fn set_speed_profile(&self, axis: u8, vmax: f32, amax: f32) -> Result<()> {
        let mut payload = BytesMut::with_capacity(8);
        payload.put_f32_le(vmax);
        payload.put_f32_le(amax);
        self.core
            .write_register(reg(REG_PROFILE_SET, axis), &payload[..])
    }

    pub fn battery_stats(&self) -> Result<BatteryStats> {
        let data = self.core.read_register(reg(REG_BATTERY, 0), 16)?;
        let mut buf = &data[..];
        Ok(BatteryStats {
            voltage: buf.get_f32_le(),
            current: buf.get_f32_le(),
            power: buf.get_f32_le(),
            charge: buf.get_f32_le(),
        })
    }

    // Debug registers. These poke the drivetrain underneath the
    // controller and are meant for bring-up, not match play.

    /// Raw encoder tick counters.
    pub fn debug_encoders(&self) -> Result<(i32, i32, i32, i32)> {
        let data = self
            .core
            .read_register(reg(REG_DEBUG, DEBUG_ENCODERS), 16)?;
        let mut buf = &data[..];
        Ok((
            buf.get_i32_le(),
            buf.get_i32_le(),
            buf.get_i32_le(),
            buf.get_i32_le(),
        ))
    }

    /// Set raw motor duty, bypassing the control loops.
    pub fn debug_set_motors(&self, left: f32, right: f32) -> Result<()> {
        let mut payload = BytesMut::with_capacity(8);
        payload.put_f32_le(left);
        payload.put_f32_le(right);
        self.core
            .write_register(reg(REG_DEBUG, DEBUG_MOTORS), &payload[..])
    }

    /// Set the controller target without the motion planner.
    pub fn debug_set_target(&self, distance: f32, angle: f32) -> Result<()> {
        let mut payload = BytesMut::with_capacity(8);
        payload.put_f32_le(distance);
        payload.put_f32_le(angle);
        self.core
            .write_register(reg(REG_DEBUG, DEBUG_TARGET), &payload[..])
    }

    pub fn debug_set_motors_enabled(&self, enabled: bool) -> Result<()> {
        self.core
            .write_register(reg(REG_DEBUG, DEBUG_MOTORS_ENABLE), &[enabled as u8])
    }

    /// Raw state of the motion controller state machine.
    pub fn debug_controller_state(&self) -> Result<u8> {
        let data = self
            .core
            .read_register(reg(REG_DEBUG, DEBUG_CONTROLLER_STATE), 1)?;
        Ok(data[0])
    }

    /// Current, temperature and duty statistics of the left motor.
    pub fn debug_left_motor_stats(&self) -> Result<(f32, f32, f32, f32)> {
        self.debug_motor_stats(DEBUG_LEFT_STATS)
    }

    /// Current, temperature and duty statistics of the right motor.
    pub fn debug_right_motor_stats(&self) -> Result<(f32, f32, f32, f32)> {
        self.debug_motor_stats(DEBUG_RIGHT_STATS)
    }

    fn debug_motor_stats(&self, side: u8) -> Result<(f32, f32, f32, f32)> {
        let data = self.core.read_register(reg(REG_DEBUG, side), 16)?;
        let mut buf = &data[..];
        Ok((
            buf.get_f32_le(),
            buf.get_f32_le(),
            buf.get_f32_le(),
            buf.get_f32_le(),
        ))
    }

    pub fn debug_set_effects(&self, effects: &LightEffects) -> Result<()> {
        self.core
            .write_register(reg(REG_DEBUG, DEBUG_EFFECTS), &effects.to_bytes())
    }

    /// Override one or all ring leds. `u32::MAX` addresses all.
    pub fn debug_set_rgb(&self, rgb: u32, brightness: u8, index: u32) -> Result<()> {
        let mut payload = BytesMut::with_capacity(9);
        payload.put_u32_le(rgb);
        payload.put_u32_le(index);
        payload.put_u8(brightness);
        self.core
            .write_register(reg(REG_DEBUG, DEBUG_RGB), &payload[..])
    }

    pub fn debug_set_popup(&self, left: f32, right: f32) -> Result<()> {
        let mut payload = BytesMut::with_capacity(8);
        payload.put_f32_le(left);
        payload.put_f32_le(right);
        self.core
            .write_register(reg(REG_DEBUG, DEBUG_POPUP), &payload[..])
    }

    pub fn debug_light_sensors(&self) -> Result<(f32, f32)> {
        let data = self
            .core
            .read_register(reg(REG_DEBUG, DEBUG_LIGHT_SENSORS), 8)?;
        let mut buf = &data[..];
        Ok((buf.get_f32_le(), buf.get_f32_le()))
    }
}

impl Unit for Drive {
    fn core(&self) -> &UnitCore {
        &self.core
    }

    fn stop_action(&self) -> Result<()> {
        self.emergency_stop()
    }
}
