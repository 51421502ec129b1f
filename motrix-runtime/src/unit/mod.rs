// Copyright (C) 2026 Motrix Robotics
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

mod actuator;
mod drive;
mod pid;

#[cfg(test)]
pub(crate) mod testbus;

pub use actuator::{Actuator, Arm};
pub use drive::{
    BatteryStats, BlinkerState, Drive, HeadlightState, LightEffects, LightProgram, RingState,
};
pub use pid::Pid;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use bytes::Buf;

use crate::bus::Bus;
use crate::telemetry::{Channel, ChannelInfo, TelemetryPacket};
use crate::{consts, Error, Result};

/// Run/stop command, shared by every unit kind.
pub(crate) const REG_RUN: u8 = 0x00;
/// Telemetry channel control. The sub-opcode selects disable (0),
/// enable (1) or downsample (2); the channel index rides the payload.
pub(crate) const REG_TELEMETRY: u8 = 0x06;
/// Pop one sample off a channel ring buffer.
pub(crate) const REG_TELEMETRY_FETCH: u8 = 0x07;
/// Channel ring buffer occupancy.
pub(crate) const REG_TELEMETRY_INFO: u8 = 0x08;
/// Ready-for-order flag.
pub(crate) const REG_READY: u8 = 0x0a;

const TELEMETRY_DOWNSAMPLE: u8 = 2;

/// Compose a register address from a base opcode and a sub-index.
pub(crate) const fn reg(opcode: u8, sub: u8) -> u8 {
    opcode | (sub << 4)
}

/// Two-state gate for stoppable commands.
///
/// The gate is open while stoppable commands may proceed and closed
/// while an emergency stop is in effect. Waiters block on a condition
/// variable without timeout; a stop that is never cleared blocks them
/// indefinitely.
pub struct Gate {
    open: Mutex<bool>,
    signal: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: Mutex::new(true),
            signal: Condvar::new(),
        }
    }

    pub fn close(&self) {
        *self.open.lock().unwrap() = false;
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.signal.notify_all();
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock().unwrap()
    }

    /// Block the calling thread until the gate is open.
    pub fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.signal.wait(open).unwrap();
        }
    }
}

/// State shared by all unit kinds.
///
/// All register I/O of a unit funnels through here and thereby
/// through the bus handle's transaction lock.
pub struct UnitCore {
    bus: Arc<Bus>,
    address: u16,
    running: AtomicBool,
    blocking: AtomicBool,
    gate: Gate,
    channels: Mutex<BTreeMap<u8, Channel>>,
}

impl UnitCore {
    pub fn new(bus: Arc<Bus>, address: u16) -> Self {
        Self {
            bus,
            address,
            running: AtomicBool::new(false),
            blocking: AtomicBool::new(true),
            gate: Gate::new(),
            channels: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn register_channel(&self, channel: Channel) {
        self.channels.lock().unwrap().insert(channel.index(), channel);
    }

    /// One register write on this unit.
    pub fn write_register(&self, register: u8, payload: &[u8]) -> Result<()> {
        self.bus.write(self.address, register, payload)
    }

    /// One register read on this unit.
    pub fn read_register(&self, register: u8, len: usize) -> Result<Vec<u8>> {
        self.bus.read(self.address, register, len)
    }

    pub fn ready_for_order(&self) -> Result<bool> {
        let data = self.read_register(REG_READY, 1)?;
        Ok(data[0] == 1)
    }

    /// Poll the ready flag until the unit accepts new orders.
    ///
    /// The bus has no asynchronous notification, so completion is a
    /// deliberate poll loop at [`consts::POLL_RATE`].
    pub fn wait_completed(&self) -> Result<()> {
        let period = Duration::from_secs(1) / consts::POLL_RATE;
        while !self.ready_for_order()? {
            std::thread::sleep(period);
        }
        Ok(())
    }

    /// Issue a command under the blocking and stop discipline.
    ///
    /// A stoppable command waits for stop clearance before touching
    /// the bus. When an emergency stop lands while the command is in
    /// flight, the command waits for clearance again and is reissued;
    /// targets at this level are absolute, so the reissue carries the
    /// same payload. Relative motion compensates instead, see
    /// [`Drive::move_by`].
    pub(crate) fn execute<F>(&self, blocking: Option<bool>, stoppable: bool, issue: F) -> Result<()>
    where
        F: Fn(&UnitCore) -> Result<()>,
    {
        let blocking = blocking.unwrap_or_else(|| self.is_blocking());

        loop {
            if stoppable {
                self.gate.wait();
            }

            issue(self)?;

            if self.bus.is_simulated() {
                return Ok(());
            }
            if blocking {
                self.wait_completed()?;
            }
            if !stoppable || self.gate.is_open() {
                return Ok(());
            }

            // Stopped mid-command. The unit has braked and reports
            // ready; hold for clearance and go again.
            self.gate.wait();

            debug!("Unit {:#04x}: reissue after stop clearance", self.address);
        }
    }
}

/// Operations common to every addressable unit.
pub trait Unit {
    fn core(&self) -> &UnitCore;

    /// Immediate stop action for this unit kind.
    ///
    /// Invoked once by [`Unit::notify_stop`] while the gate is still
    /// open. The default does nothing.
    fn stop_action(&self) -> Result<()> {
        Ok(())
    }

    /// Default blocking behaviour for commands without an override.
    fn set_blocking(&self, blocking: bool) {
        self.core().blocking.store(blocking, Ordering::Release);
    }

    fn is_blocking(&self) -> bool {
        self.core().is_blocking()
    }

    fn is_running(&self) -> bool {
        self.core().is_running()
    }

    fn start(&self) -> Result<()> {
        self.set_running(true)
    }

    fn stop(&self) -> Result<()> {
        self.set_running(false)
    }

    fn set_running(&self, on: bool) -> Result<()> {
        let core = self.core();
        core.execute(None, false, |core| {
            core.write_register(REG_RUN, &[on as u8])
        })?;
        core.running.store(on, Ordering::Release);
        Ok(())
    }

    fn ready_for_order(&self) -> Result<bool> {
        self.core().ready_for_order()
    }

    fn wait_completed(&self) -> Result<()> {
        self.core().wait_completed()
    }

    /// Emergency stop: run the unit's stop action and close the gate.
    ///
    /// Stoppable commands react at their next wait point and resume
    /// once [`Unit::notify_stop_clear`] reopens the gate. Safe to call
    /// from any thread.
    fn notify_stop(&self) -> Result<()> {
        let core = self.core();
        if core.gate.is_open() {
            self.stop_action()?;
        }
        core.gate.close();
        Ok(())
    }

    /// Clear the emergency stop, releasing all waiters.
    fn notify_stop_clear(&self) {
        self.core().gate.open();
    }

    /// Look up a channel by index.
    fn channel(&self, index: u8) -> Option<Channel> {
        self.core().channels.lock().unwrap().get(&index).cloned()
    }

    /// Look up a channel by name.
    fn channel_by_name(&self, name: &str) -> Option<Channel> {
        self.core()
            .channels
            .lock()
            .unwrap()
            .values()
            .find(|channel| channel.name() == name)
            .cloned()
    }

    /// The unit's channel catalog, ordered by index.
    fn channels(&self) -> Vec<Channel> {
        self.core().channels.lock().unwrap().values().cloned().collect()
    }

    /// Turn sample production for a channel on or off.
    fn set_channel_enabled(&self, index: u8, enabled: bool) -> Result<()> {
        let core = self.core();
        if !core.channels.lock().unwrap().contains_key(&index) {
            return Err(Error::UnknownChannel(index));
        }

        core.write_register(reg(REG_TELEMETRY, enabled as u8), &[index])?;

        if let Some(channel) = core.channels.lock().unwrap().get_mut(&index) {
            channel.set_enabled(enabled);
        }
        Ok(())
    }

    /// Keep one out of every `factor` samples on a channel.
    fn set_channel_downsample(&self, index: u8, factor: u8) -> Result<()> {
        let core = self.core();
        if !core.channels.lock().unwrap().contains_key(&index) {
            return Err(Error::UnknownChannel(index));
        }

        core.write_register(reg(REG_TELEMETRY, TELEMETRY_DOWNSAMPLE), &[index, factor])?;

        if let Some(channel) = core.channels.lock().unwrap().get_mut(&index) {
            channel.set_downsample(factor);
        }
        Ok(())
    }

    /// Ring buffer occupancy for a channel.
    fn channel_info(&self, index: u8) -> Result<ChannelInfo> {
        let core = self.core();
        if !core.channels.lock().unwrap().contains_key(&index) {
            return Err(Error::UnknownChannel(index));
        }

        let data = core.read_register(reg(REG_TELEMETRY_INFO, index), 8)?;
        let mut buf = &data[..];

        Ok(ChannelInfo {
            remaining: buf.get_u32_le(),
            packet_size: buf.get_u32_le(),
        })
    }

    /// Pop one buffered sample off a channel.
    ///
    /// Returns the new occupancy alongside the decoded sample. Each
    /// call consumes exactly one sample from the unit's ring buffer.
    fn fetch_sample(&self, index: u8) -> Result<(u32, TelemetryPacket)> {
        let channel = self.channel(index).ok_or(Error::UnknownChannel(index))?;

        let data = self
            .core()
            .read_register(reg(REG_TELEMETRY_FETCH, index), 4 + channel.size())?;
        let mut buf = &data[..];

        let remaining = buf.get_u32_le();
        let packet = channel.decode(buf)?;

        Ok((remaining, packet))
    }

    /// Drain a channel's ring buffer.
    ///
    /// Non-blocking from the unit's point of view; samples that
    /// arrive after the initial occupancy read are picked up by the
    /// next drain.
    fn drain_channel(&self, index: u8) -> Result<Vec<TelemetryPacket>> {
        let info = self.channel_info(index)?;

        let mut packets = Vec::with_capacity(info.remaining as usize);
        let mut remaining = info.remaining;
        while remaining != 0 {
            let (left, packet) = self.fetch_sample(index)?;
            packets.push(packet);
            remaining = left;
        }

        Ok(packets)
    }
}

#[cfg(test)]
mod tests {
    use super::testbus::{TestBus, TestState};
    use super::*;

    use std::time::Instant;

    fn core_on(state: &Arc<TestState>, address: u16) -> UnitCore {
        let bus = Arc::new(Bus::from_io(Box::new(TestBus::new(state.clone()))));
        UnitCore::new(bus, address)
    }

    #[test]
    fn gate_starts_open() {
        let gate = Gate::new();

        assert!(gate.is_open());
        gate.close();
        assert!(!gate.is_open());
        gate.open();
        assert!(gate.is_open());
    }

    #[test]
    fn gate_releases_waiter() {
        let gate = Arc::new(Gate::new());
        gate.close();

        let waiter = {
            let gate = gate.clone();
            std::thread::spawn(move || gate.wait())
        };

        std::thread::sleep(Duration::from_millis(50));
        gate.open();
        waiter.join().unwrap();
    }

    #[test]
    fn wait_completed_polls_at_rate() {
        let state = TestState::new();
        state.set_ready_after_polls(4);
        let core = core_on(&state, 0x69);

        let begin = Instant::now();
        core.wait_completed().unwrap();

        // Three sleeps of one poll period before the fourth poll
        // observed ready.
        assert_eq!(state.ready_polls(), 4);
        assert!(begin.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn execute_respects_blocking_override() {
        let state = TestState::new();
        state.set_ready(false);
        let core = core_on(&state, 0x69);

        // Non-blocking override returns without polling the unit.
        core.execute(Some(false), false, |core| {
            core.write_register(0x0f, &[1])
        })
        .unwrap();

        assert_eq!(state.ready_polls(), 0);
        assert_eq!(state.register(0x69, 0x0f), Some(vec![1]));
    }

    #[test]
    fn two_units_one_bus_serialize_transactions() {
        let state = TestState::new().with_transaction_delay(Duration::from_millis(2));
        let bus = Arc::new(Bus::from_io(Box::new(TestBus::new(state.clone()))));

        let mut handles = Vec::new();
        for address in [0x68u16, 0x69] {
            let core = UnitCore::new(bus.clone(), address);
            handles.push(std::thread::spawn(move || {
                for _ in 0..8 {
                    core.read_register(reg(0x03, 0), 8).unwrap();
                    core.write_register(0x01, &[0; 8]).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let windows = state.transaction_windows();
        assert_eq!(windows.len(), 32);
        for pair in windows.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "transactions overlap");
        }
    }
}
