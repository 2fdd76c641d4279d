//! # Memory accounting for the supervised process.
//!
//! [`MemoryWatch`] tracks one observed pid and reads its footprint from
//! `/proc/<pid>/statm` on demand. It subscribes to the event bus so the
//! observed pid follows the job: set on launch, cleared when the job
//! settles. Readings are best-effort; a vanished process reads as zero.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Memory footprint snapshot, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Total program size (vsize).
    pub allocated: u64,
    /// Resident set size.
    pub resident: u64,
    /// Resident shared pages.
    pub shared: u64,
}

/// Observer over one process's memory, addressed by pid.
#[derive(Debug, Default)]
pub struct MemoryWatch {
    pid: AtomicU32,
}

impl MemoryWatch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Points the watch at `pid`; 0 clears it.
    pub fn observe(&self, pid: u32) {
        self.pid.store(pid, Ordering::Release);
    }

    /// The currently observed pid, 0 when none.
    pub fn pid(&self) -> u32 {
        self.pid.load(Ordering::Acquire)
    }

    /// Snapshot of the observed process's memory, zero when unavailable.
    pub fn usage(&self) -> MemoryUsage {
        let pid = self.pid();
        if pid == 0 {
            return MemoryUsage::default();
        }
        read_statm(pid).unwrap_or_default()
    }

    /// Resident set size in bytes.
    pub fn resident(&self) -> u64 {
        self.usage().resident
    }

    /// Total program size in bytes.
    pub fn allocated(&self) -> u64 {
        self.usage().allocated
    }

    /// Shared pages in bytes.
    pub fn shared(&self) -> u64 {
        self.usage().shared
    }

    /// Number of observed processes: 1 while operational, else 0. An idle
    /// watch counts as operational, so this only drops to 0 when the watched
    /// process has vanished.
    pub fn processes(&self) -> u32 {
        u32::from(self.is_operational())
    }

    /// True when nothing is watched, or the watched process still exists.
    pub fn is_operational(&self) -> bool {
        let pid = self.pid();
        pid == 0 || process_exists(pid)
    }
}

#[async_trait]
impl Subscribe for MemoryWatch {
    fn name(&self) -> &'static str {
        "memory-watch"
    }

    async fn on_event(&self, event: &Event) {
        match event.kind {
            EventKind::ProcessLaunched => {
                if let Some(pid) = event.pid {
                    self.observe(pid);
                }
            }
            EventKind::JobCompleted | EventKind::JobFailed => self.observe(0),
            _ => {}
        }
    }
}

fn process_exists(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

/// Parses `/proc/<pid>/statm`: size, resident, shared (in pages).
fn read_statm(pid: u32) -> Option<MemoryUsage> {
    let raw = std::fs::read_to_string(format!("/proc/{pid}/statm")).ok()?;
    let mut fields = raw.split_ascii_whitespace();
    let size: u64 = fields.next()?.parse().ok()?;
    let resident: u64 = fields.next()?.parse().ok()?;
    let shared: u64 = fields.next()?.parse().ok()?;
    let page = page_size();
    Some(MemoryUsage {
        allocated: size * page,
        resident: resident * page,
        shared: shared * page,
    })
}

fn page_size() -> u64 {
    // Never negative on a functioning system.
    let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if sz > 0 {
        sz as u64
    } else {
        4096
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unobserved_reads_zero_and_is_operational() {
        let watch = MemoryWatch::new();
        assert_eq!(watch.usage(), MemoryUsage::default());
        // Idle is operational, so the process count follows suit.
        assert_eq!(watch.processes(), 1);
        assert!(watch.is_operational());
    }

    #[test]
    fn test_own_process_has_resident_memory() {
        let watch = MemoryWatch::new();
        watch.observe(std::process::id());
        let usage = watch.usage();
        assert!(usage.resident > 0);
        assert!(usage.allocated >= usage.resident);
        assert_eq!(watch.processes(), 1);
        assert!(watch.is_operational());
    }

    #[test]
    fn test_vanished_process_reads_zero() {
        let watch = MemoryWatch::new();
        // A pid from the far end of the default pid space.
        watch.observe(u32::MAX - 7);
        assert_eq!(watch.usage(), MemoryUsage::default());
        assert_eq!(watch.processes(), 0);
        assert!(!watch.is_operational());
    }

    #[tokio::test]
    async fn test_follows_launch_and_settle_events() {
        let watch = MemoryWatch::new();
        let launched =
            Event::now(EventKind::ProcessLaunched).with_pid(std::process::id());
        watch.on_event(&launched).await;
        assert_eq!(watch.pid(), std::process::id());

        watch.on_event(&Event::now(EventKind::JobCompleted)).await;
        assert_eq!(watch.pid(), 0);
    }
}
