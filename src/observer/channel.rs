//! # Kernel process-event channel.
//!
//! [`EventChannel`] abstracts the bidirectional system channel the exit bus
//! reads from: outbound control records (`LISTEN`/`IGNORE`), inbound raw
//! `proc_event` payloads. The production implementation, [`ProcConnector`],
//! speaks the Linux proc connector over a `NETLINK_CONNECTOR` socket; tests
//! inject their own channel through the same trait.
//!
//! ## Wire format (outbound control)
//! ```text
//! nlmsghdr (16) | cn_msg (20) | proc_cn_mcast_op (u32: LISTEN=1 / IGNORE=2)
//! ```
//!
//! ## Wire format (inbound)
//! ```text
//! nlmsghdr (16) | cn_msg (20) | proc_event (40)
//! ```
//! The connector strips the headers and hands the `proc_event` payload to the
//! caller. Receives use a short socket timeout so the reader thread can
//! observe its stop flag between reads.
//!
//! Opening the connector requires `CAP_NET_ADMIN`.

use std::io;
use std::mem;
use std::time::Duration;

/// Multicast group / connector index for process events (`CN_IDX_PROC`).
const CN_IDX_PROC: u32 = 1;
/// Connector value for process events (`CN_VAL_PROC`).
const CN_VAL_PROC: u32 = 1;
/// `proc_cn_mcast_op` values.
const PROC_CN_MCAST_LISTEN: u32 = 1;
const PROC_CN_MCAST_IGNORE: u32 = 2;

const NLMSGHDR_LEN: usize = 16;
const CN_MSG_LEN: usize = 20;

/// How long a blocking receive waits before yielding back to the reader loop.
const RECV_TICK: Duration = Duration::from_millis(250);

/// Bidirectional system channel carrying process events.
///
/// Implementations must be safe to move onto the bus's dedicated reader
/// thread after `open` + `control(true)` succeed.
pub trait EventChannel: Send + 'static {
    /// Opens the channel.
    fn open(&mut self) -> io::Result<()>;

    /// Sends the start/stop-listening control record.
    fn control(&mut self, listen: bool) -> io::Result<()>;

    /// Receives one event payload.
    ///
    /// Returns `Ok(None)` when the receive timed out without data; the caller
    /// uses these ticks to poll its stop flag.
    fn recv(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Closes the channel. Idempotent.
    fn close(&mut self);
}

/// Factory producing a fresh channel for each open-on-first-register
/// transition of the exit bus.
pub type ChannelFactory = Box<dyn Fn() -> Box<dyn EventChannel> + Send + Sync>;

/// Linux proc connector over a raw netlink socket.
pub struct ProcConnector {
    fd: Option<libc::c_int>,
    seq: u32,
}

impl ProcConnector {
    /// Creates an unopened connector.
    pub fn new() -> Self {
        Self { fd: None, seq: 0 }
    }

    /// A [`ChannelFactory`] producing proc connectors.
    pub fn factory() -> ChannelFactory {
        Box::new(|| Box::new(ProcConnector::new()))
    }

    fn fd(&self) -> io::Result<libc::c_int> {
        self.fd
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel is not open"))
    }
}

impl Default for ProcConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel for ProcConnector {
    fn open(&mut self) -> io::Result<()> {
        // SAFETY: plain socket(2)/setsockopt(2)/bind(2) calls on a fresh fd;
        // sockaddr_nl is zero-initialized before the used fields are set.
        unsafe {
            let fd = libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_DGRAM,
                libc::NETLINK_CONNECTOR,
            );
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }

            let timeout = libc::timeval {
                tv_sec: RECV_TICK.as_secs() as libc::time_t,
                tv_usec: RECV_TICK.subsec_micros() as libc::suseconds_t,
            };
            if libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &timeout as *const libc::timeval as *const libc::c_void,
                mem::size_of::<libc::timeval>() as libc::socklen_t,
            ) < 0
            {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }

            let mut addr: libc::sockaddr_nl = mem::zeroed();
            addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
            addr.nl_pid = std::process::id();
            addr.nl_groups = CN_IDX_PROC;
            if libc::bind(
                fd,
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            ) < 0
            {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }

            self.fd = Some(fd);
        }
        Ok(())
    }

    fn control(&mut self, listen: bool) -> io::Result<()> {
        let fd = self.fd()?;
        self.seq = self.seq.wrapping_add(1);

        let op: u32 = if listen {
            PROC_CN_MCAST_LISTEN
        } else {
            PROC_CN_MCAST_IGNORE
        };

        let mut msg = Vec::with_capacity(NLMSGHDR_LEN + CN_MSG_LEN + 4);
        // nlmsghdr
        msg.extend_from_slice(&((NLMSGHDR_LEN + CN_MSG_LEN + 4) as u32).to_ne_bytes());
        msg.extend_from_slice(&(libc::NLMSG_DONE as u16).to_ne_bytes());
        msg.extend_from_slice(&0u16.to_ne_bytes()); // flags
        msg.extend_from_slice(&self.seq.to_ne_bytes());
        msg.extend_from_slice(&std::process::id().to_ne_bytes());
        // cn_msg: cb_id {idx, val}, seq, ack, len, flags
        msg.extend_from_slice(&CN_IDX_PROC.to_ne_bytes());
        msg.extend_from_slice(&CN_VAL_PROC.to_ne_bytes());
        msg.extend_from_slice(&self.seq.to_ne_bytes());
        msg.extend_from_slice(&0u32.to_ne_bytes()); // ack
        msg.extend_from_slice(&4u16.to_ne_bytes()); // payload length
        msg.extend_from_slice(&0u16.to_ne_bytes()); // flags
        // proc_cn_mcast_op
        msg.extend_from_slice(&op.to_ne_bytes());

        // SAFETY: fd is an open socket, msg outlives the call.
        let sent = unsafe { libc::send(fd, msg.as_ptr() as *const libc::c_void, msg.len(), 0) };
        if sent < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
        let fd = self.fd()?;
        let mut buf = [0u8; 256];

        // SAFETY: buf outlives the call, length matches.
        let got = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0) };
        if got < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => {
                    Ok(None)
                }
                _ => Err(err),
            };
        }

        let got = got as usize;
        if got <= NLMSGHDR_LEN + CN_MSG_LEN {
            // Not even a full header stack; let the decoder see a NONE event.
            return Ok(Some(Vec::new()));
        }
        Ok(Some(buf[NLMSGHDR_LEN + CN_MSG_LEN..got].to_vec()))
    }

    fn close(&mut self) {
        if let Some(fd) = self.fd.take() {
            // SAFETY: fd came from socket(2) and is closed exactly once.
            unsafe {
                libc::close(fd);
            }
        }
    }
}

impl Drop for ProcConnector {
    fn drop(&mut self) {
        self.close();
    }
}
