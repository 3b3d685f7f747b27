use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

use super::message::NETLINK_GENERIC;
use super::{Error, Result};

/// Largest reply expected; cgroup stats and family replies are far smaller.
const RECV_BUFFER_SIZE: usize = 8192;

fn socket_error(op: &'static str) -> Error {
    Error::Socket {
        op,
        source: io::Error::last_os_error(),
    }
}

/// A bound `NETLINK_GENERIC` socket.
pub(super) struct Connection {
    fd: OwnedFd,
    seq: u32,
}

impl Connection {
    pub(super) fn open() -> Result<Self> {
        // SAFETY: plain socket(2) call, the result is checked below.
        let fd = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                NETLINK_GENERIC,
            )
        };
        if fd < 0 {
            return Err(socket_error("socket"));
        }
        // SAFETY: `fd` is a freshly created descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        // SAFETY: an all-zero sockaddr_nl is valid; the kernel assigns the port id.
        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        // SAFETY: `addr` outlives the call and the length matches its type.
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(socket_error("bind"));
        }

        Ok(Self { fd, seq: 0 })
    }

    /// Makes `recv` fail with `EAGAIN` after `timeout` instead of blocking forever.
    pub(super) fn set_receive_timeout(&self, timeout: Duration) -> Result<()> {
        let tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };
        // SAFETY: `tv` outlives the call and the length matches its type.
        let ret = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &tv as *const libc::timeval as *const libc::c_void,
                mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(socket_error("setsockopt"));
        }
        Ok(())
    }

    pub(super) fn next_seq(&mut self) -> u32 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    pub(super) fn send(&self, msg: &[u8]) -> Result<()> {
        // SAFETY: `msg` is a valid buffer of `msg.len()` bytes.
        let ret = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                msg.as_ptr() as *const libc::c_void,
                msg.len(),
                0,
            )
        };
        if ret < 0 {
            return Err(socket_error("send"));
        }
        if ret as usize != msg.len() {
            return Err(Error::Malformed("short netlink send"));
        }
        Ok(())
    }

    /// Receives exactly one datagram.
    pub(super) fn recv(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        // SAFETY: `buf` is writable for `buf.len()` bytes.
        let len = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if len < 0 {
            return Err(socket_error("recv"));
        }
        buf.truncate(len as usize);
        Ok(buf)
    }
}
