//! Decoded media packet types handed from the protocol engine to the
//! controller's buffer path.

use bytes::Bytes;

/// Which of the two media paths a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Audio compression type negotiated by the sender.
///
/// The protocol reports a numeric compression type: 2 is lossless ALAC,
/// 8 is AAC-ELD; anything else is carried through as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    Alac,
    AacEld,
    Other(u8),
}

impl AudioCodec {
    pub fn from_compression_type(ct: u8) -> Self {
        match ct {
            2 => AudioCodec::Alac,
            8 => AudioCodec::AacEld,
            other => AudioCodec::Other(other),
        }
    }

    /// File suffix used by the diagnostic stream dump.
    pub fn dump_extension(&self) -> &'static str {
        match self {
            AudioCodec::Alac => "alac",
            AudioCodec::AacEld => "aac",
            AudioCodec::Other(_) => "aud",
        }
    }
}

/// Audio format parameters reported by the sender at negotiation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFormat {
    pub codec: AudioCodec,
    /// Samples per frame.
    pub samples_per_frame: u16,
    /// True when the sender is screen-mirroring rather than audio-only.
    pub using_screen: bool,
    /// True for media playback (film/music) as opposed to live mirroring.
    pub is_media: bool,
    /// Raw 64-bit format descriptor from the sender.
    pub format_bits: u64,
}

/// One decoded audio buffer.
#[derive(Debug, Clone)]
pub struct AudioPacket {
    pub codec: AudioCodec,
    pub data: Bytes,
    /// Timestamp in the sender's clock domain, microseconds.
    pub remote_ts_us: u64,
    /// Local arrival time of the buffer, microseconds.
    pub local_ts_us: u64,
    pub seq: u16,
}

/// One decoded video buffer (one or more H.264 NAL units).
#[derive(Debug, Clone)]
pub struct VideoPacket {
    pub data: Bytes,
    /// Timestamp in the sender's clock domain, microseconds.
    pub remote_ts_us: u64,
    /// Local arrival time of the buffer, microseconds.
    pub local_ts_us: u64,
    pub nal_count: u32,
}

impl VideoPacket {
    /// True when the packet starts with an SPS NAL (Annex-B framing with a
    /// 4-byte start code). The stream dump rotates files on SPS boundaries.
    pub fn starts_with_sps(&self) -> bool {
        self.data.len() > 4 && self.data[4] & 0x1f == 0x07
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_from_compression_type() {
        assert_eq!(AudioCodec::from_compression_type(2), AudioCodec::Alac);
        assert_eq!(AudioCodec::from_compression_type(8), AudioCodec::AacEld);
        assert_eq!(
            AudioCodec::from_compression_type(1),
            AudioCodec::Other(1)
        );
    }

    #[test]
    fn dump_extensions() {
        assert_eq!(AudioCodec::Alac.dump_extension(), "alac");
        assert_eq!(AudioCodec::AacEld.dump_extension(), "aac");
        assert_eq!(AudioCodec::Other(0).dump_extension(), "aud");
    }

    #[test]
    fn sps_detection() {
        let sps = VideoPacket {
            data: Bytes::from_static(&[0, 0, 0, 1, 0x67, 0xaa]),
            remote_ts_us: 0,
            local_ts_us: 0,
            nal_count: 1,
        };
        assert!(sps.starts_with_sps());

        let idr = VideoPacket {
            data: Bytes::from_static(&[0, 0, 0, 1, 0x65, 0xaa]),
            remote_ts_us: 0,
            local_ts_us: 0,
            nal_count: 1,
        };
        assert!(!idr.starts_with_sps());
    }
}
