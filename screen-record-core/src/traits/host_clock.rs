use std::sync::OnceLock;
use std::time::Instant;

use crate::models::media::MediaTime;

/// Source of "now" on the host timeline shared by video and audio.
pub trait HostClock: Send + Sync {
    fn now(&self) -> MediaTime;
}

/// Monotonic clock counting nanoseconds from the first reading in the process.
///
/// The epoch is process-local, so timestamps from other processes or clocks
/// are not comparable with it. Capture sources receive the session's clock in
/// `CaptureSource::start` and stamp video with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl HostClock for MonotonicClock {
    fn now(&self) -> MediaTime {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = EPOCH.get_or_init(Instant::now);
        MediaTime::from_duration(epoch.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert_eq!(a.timescale, 1_000_000_000);
    }
}
