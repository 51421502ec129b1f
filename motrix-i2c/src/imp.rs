use std::io;
use std::os::unix::prelude::{AsRawFd, RawFd};

const I2C_RDWR: libc::c_ulong = 0x0707;

pub(crate) const I2C_M_RD: u16 = 0x0001;

/// Kernel `struct i2c_msg` as consumed by the `I2C_RDWR` ioctl.
#[repr(C)]
pub(crate) struct I2cMsg {
    pub(crate) addr: u16,
    pub(crate) flags: u16,
    pub(crate) len: u16,
    pub(crate) buf: *mut u8,
}

#[repr(C)]
struct I2cRdwrIoctlData {
    msgs: *mut I2cMsg,
    nmsgs: u32,
}

#[derive(Debug)]
pub(crate) struct Node(pub(super) RawFd);

impl Node {
    /// Run a combined transfer on the adapter.
    ///
    /// All messages are executed as a single bus transaction with a
    /// repeated start between messages, so a register select followed
    /// by a read cannot be split by another bus master.
    pub(crate) fn transfer(&self, msgs: &mut [I2cMsg]) -> io::Result<()> {
        let mut request = I2cRdwrIoctlData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };

        let rc = unsafe { libc::ioctl(self.0.as_raw_fd(), I2C_RDWR, &mut request) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0.as_raw_fd());
        }
    }
}

impl AsRawFd for Node {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}
