// Copyright (C) 2026 Motrix Robotics
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::sync::Arc;

use bytes::Buf;

use super::{reg, Unit, UnitCore};
use crate::bus::Bus;
use crate::{Error, Result};

const REG_ELEVATOR: u8 = 0x01;
const REG_RIGHT_ARM: u8 = 0x02;
const REG_LEFT_ARM: u8 = 0x03;
const REG_PUMP: u8 = 0x04;

const ELEVATOR_HOME: u8 = 0;
const ELEVATOR_MOVE_ABS: u8 = 1;
const ELEVATOR_MOVE_REL: u8 = 2;
const ELEVATOR_HOMED: u8 = 3;
const ELEVATOR_POSITION: u8 = 4;

const ARM_DEPLOY: u8 = 0;
const ARM_FOLD: u8 = 1;
const ARM_TURN: u8 = 2;
const ARM_DEPLOYED: u8 = 3;
const ARM_ANGLES: u8 = 4;
const ARM_HALF_DEPLOY: u8 = 5;

/// Arm axes of the actuator unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm {
    Left,
    Right,
}

impl Arm {
    const fn base_register(self) -> u8 {
        match self {
            Arm::Right => REG_RIGHT_ARM,
            Arm::Left => REG_LEFT_ARM,
        }
    }
}

/// The actuator controller unit.
///
/// Owns the game element hardware: the lift axis, the two arms and
/// the suction pumps. Commands go through the stoppable wrapper; the
/// firmware freezes its axes on its own run register, so there is no
/// separate stop action to fire on an emergency stop.
pub struct Actuator {
    core: UnitCore,
}

impl Actuator {
    pub fn new(bus: Arc<Bus>, address: u16) -> Result<Self> {
        let actuator = Self {
            core: UnitCore::new(bus, address),
        };

        actuator.stop()?;

        Ok(actuator)
    }

    // Lift axis.

    /// Run the homing cycle of the lift.
    pub fn home_elevator(&self, blocking: Option<bool>) -> Result<()> {
        self.core.execute(blocking, true, |core| {
            core.write_register(reg(REG_ELEVATOR, ELEVATOR_HOME), &[])
        })
    }

    pub fn move_elevator_abs(&self, position: f32, blocking: Option<bool>) -> Result<()> {
        self.core.execute(blocking, true, |core| {
            core.write_register(reg(REG_ELEVATOR, ELEVATOR_MOVE_ABS), &position.to_le_bytes())
        })
    }

    pub fn move_elevator_rel(&self, offset: f32, blocking: Option<bool>) -> Result<()> {
        self.core.execute(blocking, true, |core| {
            core.write_register(reg(REG_ELEVATOR, ELEVATOR_MOVE_REL), &offset.to_le_bytes())
        })
    }

    pub fn elevator_homed(&self) -> Result<bool> {
        let data = self
            .core
            .read_register(reg(REG_ELEVATOR, ELEVATOR_HOMED), 1)?;
        Ok(data[0] != 0)
    }

    pub fn elevator_position(&self) -> Result<f32> {
        let data = self
            .core
            .read_register(reg(REG_ELEVATOR, ELEVATOR_POSITION), 4)?;
        let mut buf = &data[..];
        Ok(buf.get_f32_le())
    }

    // Arm axes.

    pub fn deploy_arm(&self, arm: Arm, blocking: Option<bool>) -> Result<()> {
        self.arm_command(arm, ARM_DEPLOY, blocking)
    }

    pub fn half_deploy_arm(&self, arm: Arm, blocking: Option<bool>) -> Result<()> {
        self.arm_command(arm, ARM_HALF_DEPLOY, blocking)
    }

    pub fn fold_arm(&self, arm: Arm, blocking: Option<bool>) -> Result<()> {
        self.arm_command(arm, ARM_FOLD, blocking)
    }

    pub fn turn_arm(&self, arm: Arm, angle: f32, blocking: Option<bool>) -> Result<()> {
        self.core.execute(blocking, true, move |core| {
            core.write_register(reg(arm.base_register(), ARM_TURN), &angle.to_le_bytes())
        })
    }

    pub fn arm_deployed(&self, arm: Arm) -> Result<bool> {
        let data = self
            .core
            .read_register(reg(arm.base_register(), ARM_DEPLOYED), 1)?;
        Ok(data[0] != 0)
    }

    /// Shoulder and wrist angle of one arm.
    pub fn arm_angles(&self, arm: Arm) -> Result<(f32, f32)> {
        let data = self
            .core
            .read_register(reg(arm.base_register(), ARM_ANGLES), 8)?;
        let mut buf = &data[..];
        Ok((buf.get_f32_le(), buf.get_f32_le()))
    }

    fn arm_command(&self, arm: Arm, action: u8, blocking: Option<bool>) -> Result<()> {
        self.core.execute(blocking, true, move |core| {
            core.write_register(reg(arm.base_register(), action), &[])
        })
    }

    // Pumps.

    /// Switch one suction pump.
    pub fn set_pump(&self, index: u8, on: bool, blocking: Option<bool>) -> Result<()> {
        if index > 0x0f {
            return Err(Error::InvalidInput);
        }

        self.core.execute(blocking, true, move |core| {
            core.write_register(reg(REG_PUMP, index), &[on as u8])
        })
    }
}

impl Unit for Actuator {
    fn core(&self) -> &UnitCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::super::testbus::{TestBus, TestState};
    use super::*;

    use std::time::Duration;

    fn actuator_on(state: &Arc<TestState>) -> Arc<Actuator> {
        let bus = Arc::new(Bus::from_io(Box::new(TestBus::new(state.clone()))));
        Arc::new(Actuator::new(bus, 0x68).unwrap())
    }

    #[test]
    fn arm_register_mapping() {
        let state = TestState::new();
        let actuator = actuator_on(&state);

        actuator.deploy_arm(Arm::Right, None).unwrap();
        actuator.fold_arm(Arm::Left, None).unwrap();
        actuator.turn_arm(Arm::Left, 1.5, None).unwrap();

        assert_eq!(state.register(0x68, 0x02), Some(vec![]));
        assert_eq!(state.register(0x68, 0x13), Some(vec![]));
        assert_eq!(
            state.register(0x68, 0x23),
            Some(1.5f32.to_le_bytes().to_vec())
        );
    }

    #[test]
    fn pump_wire_format_and_bounds() {
        let state = TestState::new();
        let actuator = actuator_on(&state);

        actuator.set_pump(2, true, None).unwrap();
        assert_eq!(state.register(0x68, reg(REG_PUMP, 2)), Some(vec![1]));

        actuator.set_pump(2, false, None).unwrap();
        assert_eq!(state.register(0x68, reg(REG_PUMP, 2)), Some(vec![0]));

        assert!(matches!(
            actuator.set_pump(16, true, None),
            Err(Error::InvalidInput)
        ));
    }

    #[test]
    fn interrupted_lift_move_is_reissued() {
        let state = TestState::new();
        let actuator = actuator_on(&state);

        let worker = {
            let state = state.clone();
            let actuator = actuator.clone();
            std::thread::spawn(move || {
                while state.lift_moves().is_empty() {
                    std::thread::sleep(Duration::from_millis(5));
                }

                actuator.notify_stop().unwrap();
                state.set_ready(true);

                std::thread::sleep(Duration::from_millis(50));
                actuator.notify_stop_clear();

                while state.lift_moves().len() < 2 {
                    std::thread::sleep(Duration::from_millis(5));
                }
                state.set_ready(true);
            })
        };

        actuator.move_elevator_abs(120.0, None).unwrap();
        worker.join().unwrap();

        // The target is absolute, so the reissue repeats it verbatim,
        // and the actuator kind has no emergency stop opcode.
        assert_eq!(state.lift_moves(), vec![120.0, 120.0]);
        assert_eq!(state.estops(), 0);
    }

    #[test]
    fn readbacks_default_zero() {
        let state = TestState::new();
        let actuator = actuator_on(&state);

        assert!(!actuator.elevator_homed().unwrap());
        assert_eq!(actuator.elevator_position().unwrap(), 0.0);
        assert!(!actuator.arm_deployed(Arm::Right).unwrap());
        assert_eq!(actuator.arm_angles(Arm::Left).unwrap(), (0.0, 0.0));
    }
}
