use rustix::time::{clock_gettime, ClockId};

/// Current monotonic time in milliseconds.
///
/// This matches the resolution of evdev timestamps, so values returned here
/// are directly comparable to the `time` field of raw events.
pub(crate) fn now_ms() -> u64 {
    let tp = clock_gettime(ClockId::Monotonic);
    tp.tv_sec as u64 * 1000 + tp.tv_nsec as u64 / 1_000_000
}
