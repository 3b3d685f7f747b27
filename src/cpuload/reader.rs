use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::info::LoadStats;

use super::conn::Connection;
use super::message::{self, TASKSTATS_FAMILY_NAME};
use super::{Error, LoadReader, Result};

/// Taskstats client over one netlink connection.
///
/// Only one request is in flight at a time; concurrent callers wait on the
/// connection lock.
pub struct NetlinkReader {
    family_id: u16,
    conn: Mutex<Option<Connection>>,
}

impl NetlinkReader {
    /// Opens the socket and resolves the taskstats family.
    ///
    /// # Errors
    ///
    /// - [`Error::Socket`] if the socket cannot be created or bound.
    /// - [`Error::FamilyNotFound`] if the kernel lacks taskstats.
    pub fn new() -> Result<Self> {
        let mut conn = Connection::open()?;
        let seq = conn.next_seq();
        conn.send(&message::encode_get_family(seq, TASKSTATS_FAMILY_NAME))?;
        let reply = recv_reply(seq, || conn.recv())?;
        let family_id = message::parse_family_id(&reply, TASKSTATS_FAMILY_NAME)?;
        log::debug!("resolved netlink family `{TASKSTATS_FAMILY_NAME}` to id {family_id}");

        Ok(Self {
            family_id,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Bounds how long a query waits for the kernel's reply.
    pub fn with_receive_timeout(self, timeout: Duration) -> Result<Self> {
        if let Some(conn) = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            conn.set_receive_timeout(timeout)?;
        }
        Ok(self)
    }

    /// Closes the connection. Later queries fail with [`Error::Closed`].
    pub fn stop(&self) {
        if self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            log::debug!("closed taskstats netlink connection");
        }
    }

    #[cfg(test)]
    fn disconnected() -> Self {
        Self {
            family_id: 0,
            conn: Mutex::new(None),
        }
    }
}

/// Receives until the reply to request `seq` arrives.
///
/// Replies to earlier requests that gave up waiting (timeout, interrupted receive)
/// are still queued on the socket and are dropped here.
fn recv_reply<F>(seq: u32, mut recv: F) -> Result<Vec<u8>>
where
    F: FnMut() -> Result<Vec<u8>>,
{
    loop {
        let reply = recv()?;
        let reply_seq = message::reply_seq(&reply)?;
        if reply_seq == seq {
            return Ok(reply);
        }
        log::debug!("dropping stale netlink reply {reply_seq}, waiting for {seq}");
    }
}

impl LoadReader for NetlinkReader {
    fn cpu_load(&self, name: &str, path: &Path) -> Result<LoadStats> {
        if path.as_os_str().is_empty() {
            return Err(Error::EmptyPath(name.to_owned()));
        }
        let dir = File::open(path).map_err(|source| Error::OpenCgroup {
            path: path.to_path_buf(),
            source,
        })?;

        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_mut().ok_or(Error::Closed)?;
        let seq = conn.next_seq();
        conn.send(&message::encode_cgroup_stats(
            self.family_id,
            seq,
            dir.as_raw_fd() as u32,
        ))?;
        let reply = recv_reply(seq, || conn.recv())?;
        let stats = message::parse_cgroup_stats(&reply, self.family_id)?;

        log::trace!("task stats of `{name}`: {stats:?}");
        Ok(stats)
    }
}
