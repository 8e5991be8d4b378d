use crate::aggregate::ChannelStore;
use crate::channel::{ChannelSample, Generation};
use crate::decoder::ChannelUpdate;
use parking_lot::Mutex;

/// The channel store behind the one lock shared by ingestion and harvest.
#[derive(Debug, Default)]
pub struct SharedStore {
    inner: Mutex<ChannelStore>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the ingestion thread with every update from one frame,
    /// so a harvest never sees a frame half-applied.
    pub fn apply_frame(&self, updates: &[ChannelUpdate], now_us: u64) {
        if updates.is_empty() {
            return;
        }
        let mut store = self.inner.lock();
        for update in updates {
            store.apply(*update, now_us);
        }
    }

    /// Called by the host's collection timer.
    pub fn harvest(&self) -> Vec<ChannelSample> {
        self.inner.lock().harvest()
    }

    pub fn sequence(&self) -> Generation {
        self.inner.lock().sequence()
    }

    /// Run `f` against the store under the lock.
    pub fn with_store<R>(&self, f: impl FnOnce(&ChannelStore) -> R) -> R {
        f(&self.inner.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelId, SampleValues};
    use crate::decoder::decode;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn identity_frame_end_to_end() {
        let store = SharedStore::new();
        let payload = [0x34, 0x12, 0x64, 0x00, 0x0A, 0x00, 0x00, 0x01, 0x32];
        store.apply_frame(&decode(0x210, &payload), 1);

        let samples = store.harvest();
        let got: Vec<(ChannelId, f64)> = samples.iter().map(|s| (s.channel, s.value())).collect();
        assert_eq!(
            got,
            [
                (ChannelId::PowerPackId, 4660.0),
                (ChannelId::AccumulatedPower, 100.0),
                (ChannelId::AccumulatedHours, 10.0),
                (ChannelId::RefuelPort, 1.0),
                (ChannelId::FuelLevel, 50.0),
            ]
        );
        assert!(store.harvest().is_empty());
        assert_eq!(store.sequence(), 2);
    }

    #[test]
    fn empty_update_set_marks_nothing() {
        let store = SharedStore::new();
        store.apply_frame(&[], 0);
        assert!(store.harvest().is_empty());
    }

    #[test]
    fn channel_updated_in_window_is_harvested_once() {
        let store = SharedStore::new();
        store.apply_frame(&decode(0x212, &[10, 0, 20, 0, 0, 0, 0, 0]), 0);
        assert_eq!(store.harvest().len(), 3);
        assert!(store.harvest().is_empty());
        store.apply_frame(&decode(0x212, &[11, 0, 20, 0, 0, 0, 0, 0]), 0);
        assert_eq!(store.harvest().len(), 3);
    }

    #[test]
    fn concurrent_updates_and_harvests_keep_bounds() {
        const PRODUCERS: usize = 4;
        const HARVESTERS: usize = 2;
        const FRAMES: u16 = 2_000;

        let store = Arc::new(SharedStore::new());
        let done = Arc::new(AtomicBool::new(false));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..FRAMES {
                        let raw = (i * 7 + p as u16 * 13) % 1000;
                        let [lo, hi] = raw.to_le_bytes();
                        let payload = [lo, hi, lo, hi, lo, hi, lo, hi];
                        store.apply_frame(&decode(0x211, &payload), u64::from(i));
                    }
                })
            })
            .collect();

        let harvesters: Vec<_> = (0..HARVESTERS)
            .map(|_| {
                let store = Arc::clone(&store);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut violations = 0usize;
                    while !done.load(Ordering::Relaxed) {
                        for sample in store.harvest() {
                            if let SampleValues::Bounded {
                                value,
                                lowest,
                                highest,
                                ..
                            } = sample.values
                            {
                                if lowest > value || value > highest {
                                    violations += 1;
                                }
                            }
                        }
                        thread::yield_now();
                    }
                    violations
                })
            })
            .collect();

        for handle in producers {
            handle.join().unwrap();
        }
        done.store(true, Ordering::Relaxed);
        for handle in harvesters {
            assert_eq!(handle.join().unwrap(), 0);
        }

        // The last write of any producer is still reachable before the next harvest.
        let last = store.with_store(|s| s.channel(ChannelId::InputVoltage).state().value());
        let finals: Vec<f64> = (0..PRODUCERS)
            .map(|p| f64::from(((FRAMES - 1) * 7 + p as u16 * 13) % 1000) / 10.0)
            .collect();
        assert!(finals.iter().any(|v| (v - last).abs() < 1e-9), "{last} not in {finals:?}");
    }
}
