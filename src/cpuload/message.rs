//! Encoding and decoding of the generic netlink messages used for taskstats.
//!
//! All multi-byte fields are in host byte order and aligned to 4 bytes.

use crate::info::LoadStats;

use super::{Error, Result};

pub(super) const NETLINK_GENERIC: i32 = 16;

const NLM_F_REQUEST: u16 = 0x0001;
const NLMSG_ERROR: u16 = 0x0002;
const NLMSG_DONE: u16 = 0x0003;

const GENL_ID_CTRL: u16 = 0x10;
const CTRL_CMD_GETFAMILY: u8 = 3;
const CTRL_ATTR_FAMILY_ID: u16 = 1;
const CTRL_ATTR_FAMILY_NAME: u16 = 2;

pub(super) const TASKSTATS_FAMILY_NAME: &str = "TASKSTATS";
const TASKSTATS_GENL_VERSION: u8 = 1;

const CGROUPSTATS_CMD_GET: u8 = 4;
const CGROUPSTATS_CMD_NEW: u8 = 5;
const CGROUPSTATS_TYPE_CGROUP_STATS: u16 = 4;
const CGROUPSTATS_CMD_ATTR_FD: u16 = 1;

const NLA_TYPE_MASK: u16 = 0x3fff;

const NLMSG_HDRLEN: usize = 16;
const GENL_HDRLEN: usize = 4;
const NLA_HDRLEN: usize = 4;
/// `struct cgroupstats`: five `u64` counters.
const CGROUPSTATS_LEN: usize = 5 * 8;

const fn align(len: usize) -> usize {
    (len + 3) & !3
}

/// A decoded generic netlink message borrowing from the receive buffer.
#[derive(Debug, PartialEq, Eq)]
pub(super) struct GenlMessage<'a> {
    pub msg_type: u16,
    pub cmd: u8,
    pub attrs: Vec<(u16, &'a [u8])>,
}

impl<'a> GenlMessage<'a> {
    fn attr(&self, attr_type: u16) -> Option<&'a [u8]> {
        self.attrs
            .iter()
            .find(|(t, _)| *t == attr_type)
            .map(|(_, payload)| *payload)
    }
}

fn encode(msg_type: u16, seq: u32, cmd: u8, attr_type: u16, payload: &[u8]) -> Vec<u8> {
    let attr_len = NLA_HDRLEN + payload.len();
    let total = NLMSG_HDRLEN + GENL_HDRLEN + align(attr_len);
    let mut msg = Vec::with_capacity(total);

    msg.extend_from_slice(&(total as u32).to_ne_bytes());
    msg.extend_from_slice(&msg_type.to_ne_bytes());
    msg.extend_from_slice(&NLM_F_REQUEST.to_ne_bytes());
    msg.extend_from_slice(&seq.to_ne_bytes());
    // Port id 0 addresses the kernel.
    msg.extend_from_slice(&0u32.to_ne_bytes());

    msg.push(cmd);
    msg.push(TASKSTATS_GENL_VERSION);
    msg.extend_from_slice(&0u16.to_ne_bytes());

    msg.extend_from_slice(&(attr_len as u16).to_ne_bytes());
    msg.extend_from_slice(&attr_type.to_ne_bytes());
    msg.extend_from_slice(payload);
    msg.resize(total, 0);

    msg
}

/// `CTRL_CMD_GETFAMILY` request resolving `name` to its family id.
pub(super) fn encode_get_family(seq: u32, name: &str) -> Vec<u8> {
    let mut payload = name.as_bytes().to_vec();
    payload.push(0);
    encode(GENL_ID_CTRL, seq, CTRL_CMD_GETFAMILY, CTRL_ATTR_FAMILY_NAME, &payload)
}

/// `CGROUPSTATS_CMD_GET` request for the cgroup directory open as `fd`.
pub(super) fn encode_cgroup_stats(family_id: u16, seq: u32, fd: u32) -> Vec<u8> {
    encode(
        family_id,
        seq,
        CGROUPSTATS_CMD_GET,
        CGROUPSTATS_CMD_ATTR_FD,
        &fd.to_ne_bytes(),
    )
}

fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_ne_bytes(buf.get(at..at + 2)?.try_into().ok()?))
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_ne_bytes(buf.get(at..at + 4)?.try_into().ok()?))
}

fn read_u64(buf: &[u8], at: usize) -> Option<u64> {
    Some(u64::from_ne_bytes(buf.get(at..at + 8)?.try_into().ok()?))
}

/// Sequence number of the first message of a reply.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if the buffer is shorter than a netlink header.
pub(super) fn reply_seq(buf: &[u8]) -> Result<u32> {
    if buf.len() < NLMSG_HDRLEN {
        return Err(Error::Malformed("short netlink header"));
    }
    read_u32(buf, 8).ok_or(Error::Malformed("short netlink header"))
}

/// Decodes the first message of a reply.
///
/// # Errors
///
/// - [`Error::Kernel`] for an `NLMSG_ERROR` reply with a non-zero code.
/// - [`Error::UnexpectedMessage`] for an acknowledgement or `NLMSG_DONE`.
/// - [`Error::Malformed`] if lengths are inconsistent.
pub(super) fn parse_reply(buf: &[u8]) -> Result<GenlMessage<'_>> {
    let len = read_u32(buf, 0).ok_or(Error::Malformed("short netlink header"))? as usize;
    let msg_type = read_u16(buf, 4).ok_or(Error::Malformed("short netlink header"))?;
    if len < NLMSG_HDRLEN || len > buf.len() {
        return Err(Error::Malformed("invalid netlink message length"));
    }
    let buf = &buf[..len];

    match msg_type {
        NLMSG_ERROR => {
            let code = read_u32(buf, NLMSG_HDRLEN)
                .ok_or(Error::Malformed("short error message"))? as i32;
            return Err(if code != 0 {
                Error::Kernel(std::io::Error::from_raw_os_error(-code))
            } else {
                Error::UnexpectedMessage(msg_type)
            });
        }
        NLMSG_DONE => return Err(Error::UnexpectedMessage(msg_type)),
        _ => {}
    }

    let cmd = *buf
        .get(NLMSG_HDRLEN)
        .ok_or(Error::Malformed("missing generic netlink header"))?;
    let mut attrs = Vec::new();
    let mut offset = NLMSG_HDRLEN + GENL_HDRLEN;
    while offset + NLA_HDRLEN <= buf.len() {
        let attr_len = read_u16(buf, offset).ok_or(Error::Malformed("short attribute"))? as usize;
        let attr_type = read_u16(buf, offset + 2).ok_or(Error::Malformed("short attribute"))?;
        if attr_len < NLA_HDRLEN || offset + attr_len > buf.len() {
            return Err(Error::Malformed("invalid attribute length"));
        }
        attrs.push((
            attr_type & NLA_TYPE_MASK,
            &buf[offset + NLA_HDRLEN..offset + attr_len],
        ));
        offset += align(attr_len);
    }

    Ok(GenlMessage {
        msg_type,
        cmd,
        attrs,
    })
}

/// Extracts the family id from a `CTRL_CMD_GETFAMILY` reply.
pub(super) fn parse_family_id(buf: &[u8], name: &str) -> Result<u16> {
    let msg = match parse_reply(buf) {
        Ok(msg) => msg,
        Err(Error::Kernel(err)) if err.raw_os_error() == Some(libc::ENOENT) => {
            return Err(Error::FamilyNotFound(name.to_owned()));
        }
        Err(err) => return Err(err),
    };
    if msg.msg_type != GENL_ID_CTRL {
        return Err(Error::UnexpectedMessage(msg.msg_type));
    }
    msg.attr(CTRL_ATTR_FAMILY_ID)
        .and_then(|payload| read_u16(payload, 0))
        .ok_or_else(|| Error::FamilyNotFound(name.to_owned()))
}

/// Extracts the task counts from a `CGROUPSTATS_CMD_NEW` reply.
pub(super) fn parse_cgroup_stats(buf: &[u8], family_id: u16) -> Result<LoadStats> {
    let msg = parse_reply(buf)?;
    if msg.msg_type != family_id || msg.cmd != CGROUPSTATS_CMD_NEW {
        return Err(Error::UnexpectedMessage(msg.msg_type));
    }
    let payload = msg
        .attr(CGROUPSTATS_TYPE_CGROUP_STATS)
        .filter(|payload| payload.len() >= CGROUPSTATS_LEN)
        .ok_or(Error::Malformed("missing cgroup stats attribute"))?;

    let counter = |index: usize| read_u64(payload, index * 8).unwrap_or_default();
    Ok(LoadStats {
        nr_sleeping: counter(0),
        nr_running: counter(1),
        nr_stopped: counter(2),
        nr_uninterruptible: counter(3),
        nr_io_wait: counter(4),
    })
}
