//! Callback gateway between the protocol engine and the controller.
//!
//! The engine invokes the fixed [`EngineCallbacks`] set synchronously from
//! its own execution context. The engine has no recovery path for callback
//! failures, so nothing may propagate past this boundary: every failure is
//! downgraded to a logged diagnostic.
//!
//! Control events (connect, disconnect, reset, teardown) are forwarded into
//! the controller's channel, its single serialization point. Media packets
//! stay on the calling thread: clock sync and delay compensation read shared
//! state but never wait on control-plane work.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use aircast_core::dmap::TrackMetadata;
use aircast_core::media::{AudioFormat, AudioPacket, MediaKind, VideoPacket};
use aircast_core::timing::delay::DelayPolicy;
use aircast_core::SharedClock;

use crate::dump::StreamDump;
use crate::metrics::Metrics;
use crate::notify::{StatusEvent, StatusHub};
use crate::render::{AudioRenderer, VideoSlot};
use crate::session::ControlEvent;

/// 1x1 white PNG written as the cover-art placeholder between tracks.
const EMPTY_COVER_ART: [u8; 95] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x01, 0x03, 0x00, 0x00, 0x00, 0x25,
    0xdb, 0x56, 0xca, 0x00, 0x00, 0x00, 0x03, 0x50, 0x4c, 0x54, 0x45, 0x00, 0x00, 0x00, 0xa7,
    0x7a, 0x3d, 0xda, 0x00, 0x00, 0x00, 0x01, 0x74, 0x52, 0x4e, 0x53, 0x00, 0x40, 0xe6, 0xd8,
    0x66, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x08, 0xd7, 0x63, 0x60, 0x00, 0x00,
    0x00, 0x02, 0x00, 0x01, 0xe2, 0x21, 0xbc, 0x33, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e,
    0x44, 0xae, 0x42, 0x60, 0x82,
];

/// The fixed callback contract the protocol engine invokes.
///
/// Every call must return before the engine proceeds; none may panic or
/// otherwise fail across the boundary.
pub trait EngineCallbacks: Send + Sync {
    fn connection_opened(&self);

    fn connection_closed(&self);

    /// Irrecoverable client timeout; `reset_video` says whether the render
    /// surface should be closed rather than left frozen.
    fn connection_reset(&self, timeout_count: u32, reset_video: bool);

    /// Control-channel teardown; the flags identify which stream types the
    /// client tore down.
    fn connection_teardown(&self, teardown_96: bool, teardown_110: bool);

    fn audio_packet(&self, packet: AudioPacket);

    fn video_packet(&self, packet: VideoPacket);

    fn audio_flush(&self);

    fn video_flush(&self);

    fn set_volume(&self, volume: f32);

    /// Audio format negotiation result for the upcoming stream.
    fn audio_format(&self, format: AudioFormat);

    /// Source and scaled video dimensions reported by the sender.
    fn video_size(&self, source_width: f32, source_height: f32, width: f32, height: f32);

    fn set_cover_art(&self, image: &[u8]);

    /// DMAP-encoded track metadata.
    fn set_metadata(&self, metadata: &[u8]);
}

pub(crate) struct SessionGateway {
    control_tx: mpsc::UnboundedSender<ControlEvent>,
    clock: Arc<SharedClock>,
    delay: DelayPolicy,
    audio: Option<Arc<dyn AudioRenderer>>,
    video: Arc<VideoSlot>,
    video_enabled: bool,
    dump: Arc<Mutex<StreamDump>>,
    status: StatusHub,
    metrics: Arc<Metrics>,
    cover_art_path: Option<std::path::PathBuf>,
}

impl SessionGateway {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        control_tx: mpsc::UnboundedSender<ControlEvent>,
        clock: Arc<SharedClock>,
        delay: DelayPolicy,
        audio: Option<Arc<dyn AudioRenderer>>,
        video: Arc<VideoSlot>,
        video_enabled: bool,
        dump: Arc<Mutex<StreamDump>>,
        status: StatusHub,
        metrics: Arc<Metrics>,
        cover_art_path: Option<std::path::PathBuf>,
    ) -> Self {
        let gateway = Self {
            control_tx,
            clock,
            delay,
            audio,
            video,
            video_enabled,
            dump,
            status,
            metrics,
            cover_art_path,
        };
        gateway.write_cover_art_placeholder();
        gateway
    }

    fn forward(&self, event: ControlEvent) {
        if self.control_tx.send(event).is_err() {
            tracing::warn!("controller is gone; dropping control event");
        }
    }

    fn write_cover_art(&self, image: &[u8]) {
        let Some(path) = self.cover_art_path.as_deref() else {
            return;
        };
        if let Err(err) = write_file(path, image) {
            tracing::error!(path = %path.display(), error = %err, "could not write cover art");
        }
    }

    pub(crate) fn write_cover_art_placeholder(&self) {
        self.write_cover_art(&EMPTY_COVER_ART);
    }
}

fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, data)
}

impl EngineCallbacks for SessionGateway {
    fn connection_opened(&self) {
        self.metrics.connection_opened();
        self.forward(ControlEvent::ClientConnected);
    }

    fn connection_closed(&self) {
        self.metrics.connection_closed();
        self.forward(ControlEvent::ClientDisconnected);
    }

    fn connection_reset(&self, timeout_count: u32, reset_video: bool) {
        self.forward(ControlEvent::ConnectionReset {
            timeout_count,
            reset_video,
        });
    }

    fn connection_teardown(&self, teardown_96: bool, teardown_110: bool) {
        self.forward(ControlEvent::ConnectionTeardown {
            teardown_96,
            teardown_110,
        });
    }

    fn audio_packet(&self, packet: AudioPacket) {
        self.metrics.audio_packet();
        self.dump.lock().write_audio(&packet);

        let Some(renderer) = self.audio.as_ref() else {
            return;
        };
        let ts = self.clock.sync(packet.remote_ts_us, packet.local_ts_us);
        let ts = self
            .delay
            .apply(MediaKind::Audio, Some(packet.codec), ts);
        if let Err(err) = renderer.render(&packet.data, packet.seq, ts) {
            tracing::warn!(seq = packet.seq, error = %err, "audio render failed");
        }
    }

    fn video_packet(&self, packet: VideoPacket) {
        self.metrics.video_packet();
        self.dump.lock().write_video(&packet);

        if !self.video_enabled {
            return;
        }
        let ts = self.clock.sync(packet.remote_ts_us, packet.local_ts_us);
        let ts = self.delay.apply(MediaKind::Video, None, ts);
        if let Err(err) = self.video.render(&packet.data, packet.nal_count, ts) {
            tracing::warn!(error = %err, "video render failed");
        }
    }

    fn audio_flush(&self) {
        if let Some(renderer) = self.audio.as_ref() {
            renderer.flush();
        }
    }

    fn video_flush(&self) {
        self.video.flush();
    }

    fn set_volume(&self, volume: f32) {
        if let Some(renderer) = self.audio.as_ref() {
            renderer.set_volume(volume);
        }
    }

    fn audio_format(&self, format: AudioFormat) {
        tracing::info!(
            codec = ?format.codec,
            samples_per_frame = format.samples_per_frame,
            using_screen = format.using_screen,
            is_media = format.is_media,
            format_bits = format!("{:#x}", format.format_bits),
            "audio format negotiated"
        );

        self.dump.lock().on_audio_format(format.codec);

        if let Some(renderer) = self.audio.as_ref() {
            if let Err(err) = renderer.start(format.codec) {
                tracing::error!(error = %err, "audio renderer start failed");
            }
        }

        // A new stream starts with the placeholder until art arrives.
        self.write_cover_art_placeholder();
    }

    fn video_size(&self, source_width: f32, source_height: f32, width: f32, height: f32) {
        self.video
            .report_size(source_width, source_height, width, height);
        self.status.emit(
            StatusEvent::VideoSizeChanged,
            format!("{width}x{height} (source {source_width}x{source_height})"),
        );
    }

    fn set_cover_art(&self, image: &[u8]) {
        if image.is_empty() {
            return;
        }
        self.write_cover_art(image);
        if let Some(path) = self.cover_art_path.as_deref() {
            tracing::info!(bytes = image.len(), path = %path.display(), "cover art written");
        }
    }

    fn set_metadata(&self, metadata: &[u8]) {
        match TrackMetadata::from_listing(metadata) {
            Ok(meta) => tracing::info!(track = %meta, "track metadata"),
            Err(err) => tracing::warn!(error = %err, "received invalid metadata"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderError;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct RecordingAudio {
        last_ts: AtomicU64,
    }

    impl AudioRenderer for RecordingAudio {
        fn start(&self, _codec: aircast_core::media::AudioCodec) -> Result<(), RenderError> {
            Ok(())
        }

        fn render(&self, _data: &[u8], _seq: u16, ts_us: u64) -> Result<(), RenderError> {
            self.last_ts.store(ts_us, Ordering::SeqCst);
            Ok(())
        }

        fn flush(&self) {}

        fn set_volume(&self, _volume: f32) {}

        fn stop(&self) {}
    }

    fn gateway_with_audio(
        delay: DelayPolicy,
    ) -> (
        SessionGateway,
        Arc<RecordingAudio>,
        mpsc::UnboundedReceiver<ControlEvent>,
        Arc<SharedClock>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let clock = Arc::new(SharedClock::new());
        let audio = Arc::new(RecordingAudio {
            last_ts: AtomicU64::new(0),
        });
        let gateway = SessionGateway::new(
            tx,
            clock.clone(),
            delay,
            Some(audio.clone()),
            Arc::new(VideoSlot::new()),
            false,
            Arc::new(Mutex::new(StreamDump::default())),
            StatusHub::default(),
            Arc::new(Metrics::new()),
            None,
        );
        (gateway, audio, rx, clock)
    }

    fn audio_packet(remote: u64, local: u64) -> AudioPacket {
        AudioPacket {
            codec: aircast_core::media::AudioCodec::Alac,
            data: Bytes::from_static(b"pcm"),
            remote_ts_us: remote,
            local_ts_us: local,
            seq: 1,
        }
    }

    #[test]
    fn audio_path_syncs_and_delays() {
        let delay = DelayPolicy {
            audio_alac_us: 500,
            audio_aac_us: 0,
            video_us: 0,
        };
        let (gateway, audio, _rx, clock) = gateway_with_audio(delay);

        gateway.audio_packet(audio_packet(1000, 5000));
        assert_eq!(clock.offset(), Some(4000));
        assert_eq!(audio.last_ts.load(Ordering::SeqCst), 5500);

        gateway.audio_packet(audio_packet(2000, 9999));
        assert_eq!(audio.last_ts.load(Ordering::SeqCst), 6500);
    }

    #[test]
    fn control_events_are_forwarded() {
        let (gateway, _audio, mut rx, _clock) = gateway_with_audio(DelayPolicy::default());

        gateway.connection_opened();
        gateway.connection_reset(5, true);
        gateway.connection_closed();

        assert!(matches!(rx.try_recv().unwrap(), ControlEvent::ClientConnected));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ControlEvent::ConnectionReset {
                timeout_count: 5,
                reset_video: true
            }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ControlEvent::ClientDisconnected
        ));
    }

    #[test]
    fn callbacks_survive_a_closed_controller() {
        let (gateway, _audio, rx, _clock) = gateway_with_audio(DelayPolicy::default());
        drop(rx);
        // Must not panic or propagate anything.
        gateway.connection_opened();
        gateway.connection_teardown(false, true);
    }

    #[test]
    fn cover_art_written_to_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.png");
        let (tx, _rx) = mpsc::unbounded_channel();
        let gateway = SessionGateway::new(
            tx,
            Arc::new(SharedClock::new()),
            DelayPolicy::default(),
            None,
            Arc::new(VideoSlot::new()),
            false,
            Arc::new(Mutex::new(StreamDump::default())),
            StatusHub::default(),
            Arc::new(Metrics::new()),
            Some(path.clone()),
        );

        // Placeholder written at construction.
        assert_eq!(std::fs::read(&path).unwrap(), EMPTY_COVER_ART);

        gateway.set_cover_art(b"real image bytes");
        assert_eq!(std::fs::read(&path).unwrap(), b"real image bytes");
    }
}
