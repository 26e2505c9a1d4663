//! Per-media-type delay compensation.

use crate::media::{AudioCodec, MediaKind};

/// Configured delays applied after clock synchronization.
///
/// ALAC and other audio codecs get independently configured delays: exactly
/// one of the two applies to a given audio packet, selected by codec
/// identity. Video has its own slot, zero unless a pipeline needs it.
///
/// Values are signed: a negative delay pulls a stream earlier relative to
/// the other one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelayPolicy {
    /// Delay for lossless (ALAC) audio, microseconds.
    pub audio_alac_us: i64,

    /// Delay for all other audio codecs (AAC-ELD and unidentified types),
    /// microseconds.
    pub audio_aac_us: i64,

    /// Video delay, microseconds. Hook point only; defaults to zero.
    pub video_us: i64,
}

impl DelayPolicy {
    /// Apply the configured delay for this packet's media kind and codec.
    ///
    /// Pure function of its inputs: timestamps clamp at zero rather than
    /// wrapping when a negative delay exceeds the timestamp.
    pub fn apply(&self, kind: MediaKind, codec: Option<AudioCodec>, ts_us: u64) -> u64 {
        let delay = match kind {
            MediaKind::Audio => match codec {
                Some(AudioCodec::Alac) if self.audio_alac_us != 0 => self.audio_alac_us,
                _ => self.audio_aac_us,
            },
            MediaKind::Video => self.video_us,
        };
        (ts_us as i64).saturating_add(delay).max(0) as u64
    }
}
