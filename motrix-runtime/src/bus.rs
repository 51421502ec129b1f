// Copyright (C) 2026 Motrix Robotics
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::path::Path;
use std::sync::Mutex;

use crate::Result;

/// Raw transaction interface under a [`Bus`].
///
/// The production implementation is the I2C adapter. Tests substitute
/// an in-memory implementation to script unit behaviour.
pub trait BusIo: Send {
    /// Write `payload` to one register of the peripheral at `address`.
    fn write_block(&mut self, address: u16, register: u8, payload: &[u8]) -> Result<()>;

    /// Fill `buf` from one register of the peripheral at `address`.
    fn read_block(&mut self, address: u16, register: u8, buf: &mut [u8]) -> Result<()>;
}

struct AdapterIo(motrix_i2c::Adapter);

impl BusIo for AdapterIo {
    fn write_block(&mut self, address: u16, register: u8, payload: &[u8]) -> Result<()> {
        self.0.write_block(address, register, payload)?;
        Ok(())
    }

    fn read_block(&mut self, address: u16, register: u8, buf: &mut [u8]) -> Result<()> {
        self.0.read_block(address, register, buf)?;
        Ok(())
    }
}

/// Handle on one physical bus.
///
/// The handle owns the single mutual exclusion lock for the bus it
/// represents. Every unit bound to the same physical bus must share
/// one handle (through `Arc`), so transactions from different units
/// are serialized while the units themselves stay independent.
///
/// The lock is scoped to exactly one transaction. It is never held
/// across a multi-step command, so two callers working the same unit
/// interleave at transaction granularity only.
pub struct Bus {
    io: Option<Mutex<Box<dyn BusIo>>>,
}

impl Bus {
    /// Open the I2C adapter at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let adapter = motrix_i2c::Adapter::open(path.as_ref())?;

        debug!("Bus adapter at {}", path.as_ref().display());

        Ok(Self::from_io(Box::new(AdapterIo(adapter))))
    }

    /// Wrap a custom transaction implementation.
    pub fn from_io(io: Box<dyn BusIo>) -> Self {
        Self {
            io: Some(Mutex::new(io)),
        }
    }

    /// A bus with no hardware attached.
    ///
    /// Writes are discarded and reads return zero-filled buffers, so
    /// the whole unit stack runs unchanged on a development host. No
    /// lock is taken on this path.
    pub fn simulated() -> Self {
        Self { io: None }
    }

    pub fn is_simulated(&self) -> bool {
        self.io.is_none()
    }

    /// One write transaction under the bus lock.
    pub fn write(&self, address: u16, register: u8, payload: &[u8]) -> Result<()> {
        match &self.io {
            Some(io) => io.lock().unwrap().write_block(address, register, payload),
            None => Ok(()),
        }
    }

    /// One read transaction under the bus lock.
    pub fn read(&self, address: u16, register: u8, len: usize) -> Result<Vec<u8>> {
        match &self.io {
            Some(io) => {
                let mut buffer = vec![0u8; len];
                io.lock().unwrap().read_block(address, register, &mut buffer)?;
                Ok(buffer)
            }
            None => Ok(vec![0u8; len]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// Records the entry and exit time of every transaction.
    struct RecordIo {
        windows: Arc<Mutex<Vec<(Instant, Instant)>>>,
    }

    impl BusIo for RecordIo {
        fn write_block(&mut self, _address: u16, _register: u8, _payload: &[u8]) -> Result<()> {
            let enter = Instant::now();
            std::thread::sleep(Duration::from_millis(2));
            self.windows.lock().unwrap().push((enter, Instant::now()));
            Ok(())
        }

        fn read_block(&mut self, _address: u16, _register: u8, buf: &mut [u8]) -> Result<()> {
            let enter = Instant::now();
            std::thread::sleep(Duration::from_millis(2));
            buf.fill(0);
            self.windows.lock().unwrap().push((enter, Instant::now()));
            Ok(())
        }
    }

    #[test]
    fn simulated_reads_zero() {
        let bus = Bus::simulated();

        assert!(bus.is_simulated());
        assert_eq!(bus.read(0x69, 0x03, 8).unwrap(), vec![0u8; 8]);
        assert!(bus.write(0x69, 0x01, &[1, 2, 3]).is_ok());
    }

    #[test]
    fn transactions_never_overlap() {
        let windows = Arc::new(Mutex::new(Vec::new()));
        let bus = Arc::new(Bus::from_io(Box::new(RecordIo {
            windows: windows.clone(),
        })));

        let mut handles = Vec::new();
        for address in [0x68u16, 0x69] {
            let bus = bus.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..8 {
                    bus.read(address, 0x03, 8).unwrap();
                    bus.write(address, 0x01, &[0; 8]).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut windows = windows.lock().unwrap().clone();
        windows.sort_by_key(|w| w.0);

        assert_eq!(windows.len(), 32);
        for pair in windows.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "transactions overlap");
        }
    }
}
