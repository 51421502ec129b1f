//! Scripted in-memory bus for unit tests.
//!
//! The backing store keeps the last payload written per register and
//! serves it back on reads, with the get/set register pairs of the
//! drive unit aliased onto each other. Motion registers flip the
//! ready flag so tests can stage completion and emergency stops from
//! a second thread.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Buf;

use crate::bus::BusIo;
use crate::Result;

pub(crate) struct TestState {
    regs: Mutex<HashMap<(u16, u8), Vec<u8>>>,
    windows: Mutex<Vec<(Instant, Instant)>>,
    delay: Mutex<Duration>,

    ready: AtomicBool,
    ready_polls: AtomicUsize,
    ready_after_polls: AtomicUsize,

    position: Mutex<(f32, f32)>,
    position_xy: Mutex<(f32, f32)>,
    moves: Mutex<Vec<(f32, f32)>>,
    lift_moves: Mutex<Vec<f32>>,
    estops: AtomicUsize,

    fetch_queue: Mutex<VecDeque<Vec<u8>>>,
}

impl TestState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            regs: Mutex::new(HashMap::new()),
            windows: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            ready: AtomicBool::new(true),
            ready_polls: AtomicUsize::new(0),
            ready_after_polls: AtomicUsize::new(0),
            position: Mutex::new((0.0, 0.0)),
            position_xy: Mutex::new((0.0, 0.0)),
            moves: Mutex::new(Vec::new()),
            lift_moves: Mutex::new(Vec::new()),
            estops: AtomicUsize::new(0),
            fetch_queue: Mutex::new(VecDeque::new()),
        })
    }

    pub(crate) fn with_transaction_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock().unwrap() = delay;
        self
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Report ready only from the n-th poll onward.
    pub(crate) fn set_ready_after_polls(&self, polls: usize) {
        self.ready_after_polls.store(polls, Ordering::SeqCst);
    }

    pub(crate) fn ready_polls(&self) -> usize {
        self.ready_polls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_position(&self, rho: f32, theta: f32) {
        *self.position.lock().unwrap() = (rho, theta);
    }

    pub(crate) fn set_position_xy(&self, x: f32, y: f32) {
        *self.position_xy.lock().unwrap() = (x, y);
    }

    pub(crate) fn moves(&self) -> Vec<(f32, f32)> {
        self.moves.lock().unwrap().clone()
    }

    pub(crate) fn lift_moves(&self) -> Vec<f32> {
        self.lift_moves.lock().unwrap().clone()
    }

    pub(crate) fn estops(&self) -> usize {
        self.estops.load(Ordering::SeqCst)
    }

    pub(crate) fn register(&self, address: u16, register: u8) -> Option<Vec<u8>> {
        self.regs.lock().unwrap().get(&(address, register)).cloned()
    }

    pub(crate) fn set_register(&self, address: u16, register: u8, payload: Vec<u8>) {
        self.regs.lock().unwrap().insert((address, register), payload);
    }

    pub(crate) fn transaction_windows(&self) -> Vec<(Instant, Instant)> {
        self.windows.lock().unwrap().clone()
    }

    pub(crate) fn push_fetch_response(&self, response: Vec<u8>) {
        self.fetch_queue.lock().unwrap().push_back(response);
    }

    fn ready_value(&self) -> bool {
        let polls = self.ready_polls.fetch_add(1, Ordering::SeqCst) + 1;
        let threshold = self.ready_after_polls.load(Ordering::SeqCst);
        if threshold > 0 {
            polls >= threshold
        } else {
            self.ready.load(Ordering::SeqCst)
        }
    }
}

pub(crate) struct TestBus {
    state: Arc<TestState>,
}

impl TestBus {
    pub(crate) fn new(state: Arc<TestState>) -> Self {
        Self { state }
    }
}

impl BusIo for TestBus {
    fn write_block(&mut self, address: u16, register: u8, payload: &[u8]) -> Result<()> {
        let state = &self.state;
        let enter = Instant::now();
        std::thread::sleep(*state.delay.lock().unwrap());

        match register {
            // Relative move: unit goes busy until the test completes it.
            0x01 if payload.len() == 8 => {
                let mut buf = payload;
                state.set_ready(false);
                state
                    .moves
                    .lock()
                    .unwrap()
                    .push((buf.get_f32_le(), buf.get_f32_le()));
            }
            // Emergency stop opcode.
            0x10 => {
                state.estops.fetch_add(1, Ordering::SeqCst);
            }
            // Lift absolute move.
            0x11 if payload.len() == 4 => {
                let mut buf = payload;
                state.set_ready(false);
                state.lift_moves.lock().unwrap().push(buf.get_f32_le());
            }
            _ => {}
        }

        let mut regs = state.regs.lock().unwrap();
        // The set registers of get/set pairs read back on the get side.
        match register & 0x0f {
            0x05 => {
                regs.insert((address, (register & 0xf0) | 0x02), payload.to_vec());
            }
            0x0d => {
                regs.insert((address, (register & 0xf0) | 0x0c), payload.to_vec());
            }
            _ => {}
        }
        regs.insert((address, register), payload.to_vec());
        drop(regs);

        state.windows.lock().unwrap().push((enter, Instant::now()));
        Ok(())
    }

    fn read_block(&mut self, address: u16, register: u8, buf: &mut [u8]) -> Result<()> {
        let state = &self.state;
        let enter = Instant::now();
        std::thread::sleep(*state.delay.lock().unwrap());

        buf.fill(0);

        if register == 0x0a {
            buf[0] = state.ready_value() as u8;
        } else if register == 0x03 {
            let (rho, theta) = *state.position.lock().unwrap();
            buf[..4].copy_from_slice(&rho.to_le_bytes());
            buf[4..8].copy_from_slice(&theta.to_le_bytes());
        } else if register == 0x13 {
            let (x, y) = *state.position_xy.lock().unwrap();
            buf[..4].copy_from_slice(&x.to_le_bytes());
            buf[4..8].copy_from_slice(&y.to_le_bytes());
        } else if register & 0x0f == 0x07 {
            if let Some(response) = state.fetch_queue.lock().unwrap().pop_front() {
                let len = response.len().min(buf.len());
                buf[..len].copy_from_slice(&response[..len]);
            }
        } else if let Some(stored) = state.regs.lock().unwrap().get(&(address, register)) {
            let len = stored.len().min(buf.len());
            buf[..len].copy_from_slice(&stored[..len]);
        }

        state.windows.lock().unwrap().push((enter, Instant::now()));
        Ok(())
    }
}
