//! # Decoded kernel process events.
//!
//! The proc connector delivers fixed-size `proc_event` structures. This
//! module decodes the raw payload into [`ExitRecord`]: event kind, pid,
//! thread-group id, and (for exit events) the raw exit code.
//!
//! Layout of `proc_event` (native endianness):
//!
//! ```text
//! offset 0   u32 what          event kind tag
//! offset 4   u32 cpu
//! offset 8   u64 timestamp_ns
//! offset 16  union event_data  first two words are pid/tgid for every kind
//!                              this crate cares about; exit adds exit_code
//!                              at offset 24 and exit_signal at offset 28
//! ```
//!
//! A short or garbled buffer decodes to [`ExitEventKind::None`] rather than
//! failing: undersized input is zero-padded before decoding, and an unknown
//! tag maps to `None`.

/// Fixed size of the kernel `proc_event` structure.
const PROC_EVENT_SIZE: usize = 40;

/// Event kind tags from `linux/cn_proc.h`; `PROC_EVENT_NONE` is 0.
const PROC_EVENT_FORK: u32 = 0x0000_0001;
const PROC_EVENT_EXEC: u32 = 0x0000_0002;
const PROC_EVENT_UID: u32 = 0x0000_0004;
const PROC_EVENT_GID: u32 = 0x0000_0040;
const PROC_EVENT_EXIT: u32 = 0x8000_0000;

/// Kind of a kernel process event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitEventKind {
    /// No event (also the decode result for short/garbled buffers).
    None,
    /// A process forked.
    Fork,
    /// A process performed exec.
    Exec,
    /// A process changed its uid.
    Uid,
    /// A process changed its gid.
    Gid,
    /// A process exited.
    Exit,
}

/// One decoded kernel process event.
///
/// `exit_code` is only meaningful when `kind` is [`ExitEventKind::Exit`]; it
/// carries the raw wait status, so callers test `code & 0xFFFF` for success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRecord {
    /// Event classification.
    pub kind: ExitEventKind,
    /// Process id the event refers to (fork: the parent).
    pub pid: u32,
    /// Thread-group id the event refers to.
    pub tgid: u32,
    /// Raw exit code; 0 unless `kind == Exit`.
    pub exit_code: u32,
}

impl ExitRecord {
    /// Decodes a raw `proc_event` payload.
    ///
    /// Undersized buffers are zero-padded; oversized buffers are truncated to
    /// the structure size.
    pub fn decode(payload: &[u8]) -> Self {
        let mut raw = [0u8; PROC_EVENT_SIZE];
        let n = payload.len().min(PROC_EVENT_SIZE);
        raw[..n].copy_from_slice(&payload[..n]);

        let kind = match read_u32(&raw, 0) {
            PROC_EVENT_FORK => ExitEventKind::Fork,
            PROC_EVENT_EXEC => ExitEventKind::Exec,
            PROC_EVENT_UID => ExitEventKind::Uid,
            PROC_EVENT_GID => ExitEventKind::Gid,
            PROC_EVENT_EXIT => ExitEventKind::Exit,
            _ => ExitEventKind::None,
        };

        if kind == ExitEventKind::None {
            return Self {
                kind,
                pid: 0,
                tgid: 0,
                exit_code: 0,
            };
        }

        Self {
            kind,
            pid: read_u32(&raw, 16),
            tgid: read_u32(&raw, 20),
            exit_code: match kind {
                ExitEventKind::Exit => read_u32(&raw, 24),
                _ => 0,
            },
        }
    }

    /// True when this record reports the exit of `pid`.
    pub fn is_exit_of(&self, pid: u32) -> bool {
        self.kind == ExitEventKind::Exit && pid != 0 && self.pid == pid
    }
}

fn read_u32(raw: &[u8; PROC_EVENT_SIZE], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&raw[offset..offset + 4]);
    u32::from_ne_bytes(bytes)
}
