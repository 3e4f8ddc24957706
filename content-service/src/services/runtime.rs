//! Process resource figures for `GET /api/health/runtime`.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use sysinfo::{Pid, System as SysInfo};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// System allocator wrapper that keeps a running total of live heap bytes.
///
/// Installing it is left to the binary:
///
/// ```ignore
/// #[global_allocator]
/// static GLOBAL: TrackingAllocator = TrackingAllocator;
/// ```
///
/// Without it the heap figure is reported as unavailable.
pub struct TrackingAllocator;

static HEAP_IN_USE: AtomicUsize = AtomicUsize::new(0);
static TRACKING: AtomicBool = AtomicBool::new(false);

impl TrackingAllocator {
    fn record_alloc(size: usize) {
        HEAP_IN_USE.fetch_add(size, Ordering::Relaxed);
        TRACKING.store(true, Ordering::Relaxed);
    }
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            Self::record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            Self::record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        HEAP_IN_USE.fetch_sub(layout.size(), Ordering::Relaxed);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            HEAP_IN_USE.fetch_sub(layout.size(), Ordering::Relaxed);
            Self::record_alloc(new_size);
        }
        new_ptr
    }
}

/// Live heap bytes, or `None` when [`TrackingAllocator`] is not the global allocator.
pub fn heap_in_use() -> Option<usize> {
    TRACKING
        .load(Ordering::Relaxed)
        .then(|| HEAP_IN_USE.load(Ordering::Relaxed))
}

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

/// When this process started.
///
/// Read from the OS process table on first use, so time spent before the
/// first call still counts. Falls back to the time of the first call.
pub fn process_started_at() -> Instant {
    *PROCESS_START.get_or_init(|| {
        let now = Instant::now();
        process_run_time()
            .and_then(|run_time| now.checked_sub(run_time))
            .unwrap_or(now)
    })
}

fn process_run_time() -> Option<Duration> {
    let pid = current_pid()?;
    let mut system = SysInfo::new();
    system.refresh_process(pid);
    system
        .process(pid)
        .map(|process| Duration::from_secs(process.run_time()))
}

/// Point-in-time resource usage of this process. `None` marks a figure that
/// could not be read.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeSnapshot {
    pub uptime_secs: u64,
    pub rss_bytes: Option<u64>,
    pub heap_used_bytes: Option<u64>,
}

impl RuntimeSnapshot {
    pub fn rss_mb(&self) -> Option<u64> {
        self.rss_bytes.map(bytes_to_mb)
    }

    pub fn heap_used_mb(&self) -> Option<u64> {
        self.heap_used_bytes.map(bytes_to_mb)
    }
}

/// Reads uptime and memory for the current process.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeSampler {
    started_at: Instant,
}

impl RuntimeSampler {
    /// Uptime measured from process start.
    pub fn new() -> Self {
        Self::started_at(process_started_at())
    }

    pub fn started_at(started_at: Instant) -> Self {
        Self { started_at }
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs_f64().round() as u64,
            rss_bytes: resident_memory(),
            heap_used_bytes: heap_in_use().map(|bytes| bytes as u64),
        }
    }
}

impl Default for RuntimeSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn current_pid() -> Option<Pid> {
    match sysinfo::get_current_pid() {
        Ok(pid) => Some(pid),
        Err(e) => {
            tracing::warn!(error = %e, "Unable to determine current pid");
            None
        }
    }
}

fn resident_memory() -> Option<u64> {
    let pid = current_pid()?;
    let mut system = SysInfo::new();
    system.refresh_process(pid);
    let rss = system.process(pid).map(|process| process.memory());
    if rss.is_none() {
        tracing::warn!(pid = %pid, "Resident memory unavailable");
    }
    rss
}

/// Whole megabytes, rounded half up.
pub fn bytes_to_mb(bytes: u64) -> u64 {
    (bytes as f64 / BYTES_PER_MB).round() as u64
}
