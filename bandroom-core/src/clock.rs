//! Monotonic and wall-clock time sources.
//!
//! The scheduler needs a monotonic nanosecond clock immune to wall-clock
//! adjustments for drift correction; tick payloads and `lastTickTimestamp`
//! need wall-clock milliseconds for clients to display. Both are exposed
//! through one small facade so call sites never reach for `Instant` or
//! `SystemTime` directly.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static EPOCH: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// Current monotonic time in nanoseconds since an arbitrary, process-local
/// epoch. Only meaningful for computing *differences* within one process.
pub fn mono_ns() -> u64 {
    epoch().elapsed().as_nanos() as u64
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn wall_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
