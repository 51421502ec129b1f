mod error;
mod imp;

#[macro_use]
extern crate log;

pub use error::{Error, ErrorKind, Result};

use std::os::unix::prelude::{AsRawFd, OsStrExt, RawFd};
use std::path::Path;

/// Largest register payload accepted in a single block transfer.
///
/// This matches the SMBus block length limit. The controllers on the
/// other side of the bus buffer at most this many bytes per register
/// transaction, so larger transfers are rejected before touching the
/// adapter.
pub const BLOCK_MAX: usize = 32;

/// An open I2C adapter (`/dev/i2c-*`).
///
/// The adapter addresses one peripheral per transfer. Register writes
/// and register reads are issued as combined transactions so that a
/// register select and the data phase can never be separated on the
/// wire.
#[derive(Debug)]
pub struct Adapter(imp::Node);

impl Adapter {
    /// Open an adapter by device node path.
    pub fn open(path: &Path) -> Result<Self> {
        let node = std::ffi::CString::new(path.as_os_str().as_bytes())
            .map_err(|_| Error::new(ErrorKind::InvalidInput, "path contains a NUL byte"))?;

        let fd = unsafe { libc::open(node.as_ptr(), libc::O_RDWR | libc::O_CLOEXEC) };
        if fd < 0 {
            return Err(Error::from_io(std::io::Error::last_os_error()));
        }

        trace!("Open adapter {}", path.display());

        Ok(Self(imp::Node(fd)))
    }

    /// Write `payload` to `register` of the peripheral at `address`.
    ///
    /// An empty payload is a valid transfer and selects the register
    /// without a data phase, which the peripherals interpret as a
    /// parameterless command.
    pub fn write_block(&self, address: u16, register: u8, payload: &[u8]) -> Result<()> {
        check_address(address)?;
        if payload.len() > BLOCK_MAX {
            return Err(Error::new(ErrorKind::InvalidInput, "payload exceeds block limit"));
        }

        let mut buffer = Vec::with_capacity(1 + payload.len());
        buffer.push(register);
        buffer.extend_from_slice(payload);

        let mut msgs = [imp::I2cMsg {
            addr: address,
            flags: 0,
            len: buffer.len() as u16,
            buf: buffer.as_mut_ptr(),
        }];

        self.0.transfer(&mut msgs).map_err(Error::from_io)
    }

    /// Read `buf.len()` bytes from `register` of the peripheral at `address`.
    ///
    /// The register select and the read phase run as one combined
    /// transaction with a repeated start in between.
    pub fn read_block(&self, address: u16, register: u8, buf: &mut [u8]) -> Result<()> {
        check_address(address)?;
        if buf.len() > BLOCK_MAX {
            return Err(Error::new(ErrorKind::InvalidInput, "read exceeds block limit"));
        }

        let mut register = register;

        let mut msgs = [
            imp::I2cMsg {
                addr: address,
                flags: 0,
                len: 1,
                buf: &mut register,
            },
            imp::I2cMsg {
                addr: address,
                flags: imp::I2C_M_RD,
                len: buf.len() as u16,
                buf: buf.as_mut_ptr(),
            },
        ];

        self.0.transfer(&mut msgs).map_err(Error::from_io)
    }
}

impl AsRawFd for Adapter {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

fn check_address(address: u16) -> Result<()> {
    // 7-bit addressing only. The units never use 10-bit addresses.
    if address > 0x7f {
        Err(Error::new(ErrorKind::InvalidInput, "address out of 7-bit range"))
    } else {
        Ok(())
    }
}
