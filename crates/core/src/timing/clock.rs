//! Remote-to-local clock offset, established once per session.

use parking_lot::Mutex;

/// Maps the sender's timestamp domain onto the local render clock.
///
/// The offset is established by the first packet (audio or video, whichever
/// arrives first) delivered while the clock is unset, and every later packet
/// of either kind is shifted by that same offset. The offset stays fixed
/// until [`reset`](SharedClock::reset), which the controller calls when the
/// session's open-connection count returns to zero.
///
/// Readers observe either the unset state or the final value; the mutex is
/// held only long enough to read or seed the offset, so the media hot path
/// never waits on control-plane work.
#[derive(Debug, Default)]
pub struct SharedClock {
    offset_us: Mutex<Option<i64>>,
}

impl SharedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronize a remote timestamp, seeding the offset on first use.
    ///
    /// Returns `remote_us + offset` where `offset` was fixed by the first
    /// call after the last reset as `local_arrival_us - remote_us`. For that
    /// first call the result is therefore exactly `local_arrival_us`.
    pub fn sync(&self, remote_us: u64, local_arrival_us: u64) -> u64 {
        let mut guard = self.offset_us.lock();
        let offset = *guard.get_or_insert(local_arrival_us as i64 - remote_us as i64);
        (remote_us as i64).saturating_add(offset).max(0) as u64
    }

    /// Current offset in microseconds, `None` until the first sample.
    pub fn offset(&self) -> Option<i64> {
        *self.offset_us.lock()
    }

    pub fn is_synced(&self) -> bool {
        self.offset_us.lock().is_some()
    }

    /// Clear the offset; the next packet of either kind re-establishes it.
    pub fn reset(&self) {
        *self.offset_us.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_establishes_offset() {
        let clock = SharedClock::new();
        assert!(!clock.is_synced());

        // First packet: remote 1000, arrived locally at 5000.
        assert_eq!(clock.sync(1000, 5000), 5000);
        assert_eq!(clock.offset(), Some(4000));
    }

    #[test]
    fn offset_is_shared_across_media_kinds() {
        let clock = SharedClock::new();
        clock.sync(1000, 5000);

        // A later video packet uses the audio-established offset; its own
        // arrival time is ignored.
        assert_eq!(clock.sync(1200, 99_999), 5200);
    }

    #[test]
    fn later_samples_never_move_the_offset() {
        let clock = SharedClock::new();
        clock.sync(1000, 5000);
        clock.sync(2000, 7777);
        assert_eq!(clock.offset(), Some(4000));
    }

    #[test]
    fn reset_allows_reestablishment() {
        let clock = SharedClock::new();
        clock.sync(1000, 5000);
        clock.reset();
        assert!(!clock.is_synced());

        assert_eq!(clock.sync(100, 200), 200);
        assert_eq!(clock.offset(), Some(100));
    }

    #[test]
    fn negative_offset_is_representable() {
        // Sender clock ahead of ours: local arrival smaller than remote.
        let clock = SharedClock::new();
        assert_eq!(clock.sync(5000, 1000), 1000);
        assert_eq!(clock.offset(), Some(-4000));
        assert_eq!(clock.sync(6000, 0), 2000);
    }

    #[test]
    fn zero_offset_still_counts_as_synced() {
        // The original sentinel encoding (0 == unset) would re-seed here.
        let clock = SharedClock::new();
        clock.sync(4000, 4000);
        assert!(clock.is_synced());
        assert_eq!(clock.offset(), Some(0));
        assert_eq!(clock.sync(9000, 1), 9000);
    }
}
