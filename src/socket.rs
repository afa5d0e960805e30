//! A raw BlueZ HCI socket bound to one adapter by numeric device index.
//!
//! Adapted from the teacher crate's `socket.rs`: the `HCIAddr`/`syscall!`/
//! `poll_with_timeout` plumbing is kept close to the original, generalised
//! behind a [`RawChannel`] trait so the task layer can run against either a
//! real socket or a scripted mock (see `tests/` for the mock).

use libc::{
    c_int, c_ushort, c_void, pollfd, poll, sa_family_t, sockaddr_storage, socklen_t, AF_BLUETOOTH,
    EAGAIN, EINTR, ETIMEDOUT, POLLIN, SOCK_CLOEXEC, SOCK_RAW,
};
use socket2::{Domain, Protocol, SockAddr, Socket as Socket2, Type};
use std::io::Error as IoError;
use std::mem::zeroed;
use std::os::fd::AsRawFd;
use std::ptr::{addr_of, addr_of_mut, copy_nonoverlapping};

use crate::error::{HciError, Result};
use crate::filter::{HciFilter, FILTER_LEN};
use crate::framing::{PacketType, HCI_ACLDATA_PKT, HCI_COMMAND_PKT};

const SOL_HCI: c_int = 0;
const HCI_FILTER: c_int = 2;
const PROTO_HCI: c_int = 1;

/// Helper macro to execute a system call that returns an `io::Result`.
/// Copied from socket2's own pattern, as the teacher crate did.
macro_rules! syscall {
    ($fn:ident ( $($arg:expr),* $(,)* ) ) => {{
        #[allow(unused_unsafe)]
        let res = unsafe { libc::$fn($($arg,)*) };
        if res == -1 {
            Err(IoError::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

#[repr(C)]
struct HciAddr {
    family: sa_family_t,
    device: c_ushort,
    channel: c_ushort,
}

impl HciAddr {
    fn as_sock_addr(&self) -> SockAddr {
        unsafe {
            let mut storage: sockaddr_storage = zeroed();
            copy_nonoverlapping(self, &mut storage as *mut _ as *mut Self, 1);
            let len: u32 = std::mem::size_of::<Self>().try_into().unwrap();
            SockAddr::new(storage, len)
        }
    }
}

/// A channel that sends and receives raw HCI packet bytes. `Socket`
/// implements this against a real adapter; tests implement it against a
/// scripted byte sequence to exercise partial-read reassembly without
/// hardware.
pub trait RawChannel {
    fn send(&self, buf: &[u8]) -> Result<usize>;

    /// Read whatever bytes are currently available, blocking up to
    /// `timeout_ms` (`None` = block forever). Returns `0` only at EOF; a
    /// timeout is reported as [`HciError::Timeout`].
    fn recv(&self, buf: &mut [u8], timeout_ms: Option<u32>) -> Result<usize>;
}

/// A raw `AF_BLUETOOTH`/`SOCK_RAW` socket bound to one HCI device index.
pub struct Socket(Socket2);

impl Socket {
    pub fn new(device_id: u16) -> Result<Socket> {
        let domain = Domain::from(AF_BLUETOOTH);
        let ty = Type::from(SOCK_RAW | SOCK_CLOEXEC);
        let protocol = Protocol::from(PROTO_HCI);

        let socket = Socket2::new(domain, ty, Some(protocol))?;

        let address = HciAddr {
            family: AF_BLUETOOTH as sa_family_t,
            device: device_id,
            channel: 0,
        };
        socket.bind(&address.as_sock_addr())?;

        Ok(Socket(socket))
    }

    pub fn get_filter(&self) -> Result<HciFilter> {
        let mut buf = [0u8; FILTER_LEN];
        let mut len = FILTER_LEN as socklen_t;
        syscall!(getsockopt(
            self.0.as_raw_fd(),
            SOL_HCI,
            HCI_FILTER,
            addr_of_mut!(buf) as *mut c_void,
            &mut len
        ))?;
        Ok(HciFilter::from_bytes(buf))
    }

    pub fn set_filter(&self, filter: &HciFilter) -> Result<()> {
        let buf = filter.as_bytes();
        syscall!(setsockopt(
            self.0.as_raw_fd(),
            SOL_HCI,
            HCI_FILTER,
            addr_of!(*buf).cast(),
            FILTER_LEN as socklen_t
        ))?;
        Ok(())
    }

    /// Send an HCI command packet: `[0x01, opcode_lo, opcode_hi, plen, params...]`.
    pub fn send_command(&self, opcode: u16, params: Option<&[u8]>) -> Result<usize> {
        let params = params.unwrap_or(&[]);
        let mut buf = Vec::with_capacity(4 + params.len());
        buf.push(HCI_COMMAND_PKT);
        buf.extend_from_slice(&opcode.to_le_bytes());
        buf.push(params.len() as u8);
        buf.extend_from_slice(params);
        RawChannel::send(self, &buf)
    }

    /// Send an ACL data packet: handle and flags packed into one 16-bit
    /// field (`handle | pb_flag << 12 | bc_flag << 14`), per the Core
    /// Specification's HCI ACL Data Packet format.
    pub fn send_acl_data(
        &self,
        connection_handle: u16,
        pb_flag: u8,
        bc_flag: u8,
        payload: &[u8],
    ) -> Result<usize> {
        let handle_and_flags =
            (connection_handle & 0x0fff) | ((pb_flag as u16 & 0x3) << 12) | ((bc_flag as u16 & 0x3) << 14);
        let mut buf = Vec::with_capacity(5 + payload.len());
        buf.push(HCI_ACLDATA_PKT);
        buf.extend_from_slice(&handle_and_flags.to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        buf.extend_from_slice(payload);
        RawChannel::send(self, &buf)
    }
}

fn poll_with_timeout(fd: c_int, timeout_ms: c_int) -> Result<()> {
    let mut p = pollfd {
        fd,
        events: POLLIN,
        revents: 0,
    };
    let mut n: c_int;
    while {
        n = unsafe { poll(&mut p, 1, timeout_ms) };
        n < 0
    } {
        let e = IoError::last_os_error();
        match e.raw_os_error() {
            Some(EAGAIN) | Some(EINTR) => continue,
            _ => return Err(e.into()),
        }
    }
    if n == 0 {
        Err(HciError::Timeout {
            what: "HCI socket readable",
        })
    } else {
        Ok(())
    }
}

impl RawChannel for Socket {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        Ok(self.0.send(buf)?)
    }

    fn recv(&self, buf: &mut [u8], timeout_ms: Option<u32>) -> Result<usize> {
        if let Some(ms) = timeout_ms {
            poll_with_timeout(self.0.as_raw_fd(), ms as c_int)?;
        }
        // Safety: `recv` never reads uninitialised bytes back into `buf`
        // before they are written by the kernel; `MaybeUninit<u8>` and
        // `u8` have the same layout.
        let uninit = unsafe {
            std::slice::from_raw_parts_mut(
                buf.as_mut_ptr() as *mut std::mem::MaybeUninit<u8>,
                buf.len(),
            )
        };
        Ok(self.0.recv(uninit)?)
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> c_int {
        self.0.as_raw_fd()
    }
}

/// Everything the BlueZ Set Filter socket option needs for a one-shot
/// command/response exchange: events plus the responding opcode.
pub fn command_response_filter(opcode: u16) -> HciFilter {
    HciFilter::new()
        .ptype(PacketType::Event)
        .event(crate::event::EVT_COMMAND_COMPLETE)
        .event(crate::event::EVT_COMMAND_STATUS)
        .opcode_filter(opcode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_response_filter_matches_both_completion_events() {
        let f = command_response_filter(0x0c03);
        assert_eq!(f.opcode(), 0x0c03);
        assert_ne!(f.event_mask() & (1 << crate::event::EVT_COMMAND_COMPLETE), 0);
        assert_ne!(f.event_mask() & (1 << crate::event::EVT_COMMAND_STATUS), 0);
    }
}
