use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Monotonic clock anchored to a wall-clock reading taken at the same moment.
#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
    start_unix_us: u64,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            start_unix_us: unix_now_us(),
        }
    }

    /// Monotonic microseconds since start.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Wall-clock microseconds since Unix epoch.
    pub fn unix_us(&self) -> u64 {
        unix_now_us()
    }

    /// Map a monotonic stamp from [`TimeBase::now_us`] onto the wall clock.
    pub fn to_unix_us(&self, monotonic_us: u64) -> u64 {
        self.start_unix_us.saturating_add(monotonic_us)
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_stamps_map_onto_wall_clock() {
        let tb = TimeBase::new();
        let stamp = tb.now_us();
        let mapped = tb.to_unix_us(stamp);
        assert!(mapped >= tb.to_unix_us(0));
        assert!(mapped <= tb.unix_us() + 1_000_000);
    }
}
