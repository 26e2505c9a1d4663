//! Diagnostic raw-stream dumping.
//!
//! When configured, the undecoded audio and video payloads are appended to
//! rolling files for offline inspection. Audio files rotate when the codec
//! changes (the suffix names the codec); video files rotate on SPS NAL
//! boundaries when a frame limit is set, and an Annex-B start-code mark is
//! written at each file boundary so dumps stay parseable. Dump failures are
//! logged and never disturb the media path.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use aircast_core::config::DumpConfig;
use aircast_core::media::{AudioCodec, AudioPacket, VideoPacket};

const ANNEX_B_MARK: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

struct AudioDump {
    base: PathBuf,
    file: Option<File>,
    codec: Option<AudioCodec>,
    file_index: u32,
    frame_limit: u32,
    frames_written: u32,
}

impl AudioDump {
    fn new(base: PathBuf, frame_limit: u32) -> Self {
        Self {
            base,
            file: None,
            codec: None,
            file_index: 0,
            frame_limit,
            frames_written: 0,
        }
    }

    /// A codec change closes the current file so the next write opens one
    /// with the matching suffix.
    fn on_format(&mut self, codec: AudioCodec) {
        if self.codec != Some(codec) {
            self.file = None;
            self.codec = Some(codec);
        }
    }

    fn write(&mut self, packet: &AudioPacket) {
        if self.codec != Some(packet.codec) {
            self.file = None;
            self.codec = Some(packet.codec);
        }

        if self.file.is_none() {
            self.file_index += 1;
            self.frames_written = 0;
            let path = self.base.with_extension(format!(
                "{}.{}",
                self.file_index,
                packet.codec.dump_extension()
            ));
            match File::create(&path) {
                Ok(file) => self.file = Some(file),
                Err(err) => {
                    tracing::error!(path = %path.display(), error = %err,
                        "could not open audio dump file");
                    return;
                }
            }
        }

        if let Some(file) = self.file.as_mut() {
            if let Err(err) = file.write_all(&packet.data) {
                tracing::warn!(error = %err, "audio dump write failed");
            }
            if self.frame_limit != 0 {
                self.frames_written += 1;
                if self.frames_written == self.frame_limit {
                    self.file = None;
                }
            }
        }
    }
}

struct VideoDump {
    base: PathBuf,
    file: Option<File>,
    file_index: u32,
    frame_limit: u32,
    frames_written: u32,
}

impl VideoDump {
    fn new(base: PathBuf, frame_limit: u32) -> Self {
        Self {
            base,
            file: None,
            file_index: 0,
            frame_limit,
            frames_written: 0,
        }
    }

    fn write(&mut self, packet: &VideoPacket) {
        // With a frame limit, a new parameter set starts a new file.
        if self.frame_limit != 0 && packet.starts_with_sps() {
            self.close();
        }

        if self.file.is_none() {
            let path = if self.frame_limit != 0 {
                self.file_index += 1;
                self.base.with_extension(format!("{}.h264", self.file_index))
            } else {
                self.base.with_extension("h264")
            };
            self.frames_written = 0;
            match File::create(&path) {
                Ok(file) => self.file = Some(file),
                Err(err) => {
                    tracing::error!(path = %path.display(), error = %err,
                        "could not open video dump file");
                    return;
                }
            }
        }

        if let Some(file) = self.file.as_mut() {
            if self.frame_limit != 0 && self.frames_written >= self.frame_limit {
                return;
            }
            if let Err(err) = file.write_all(&packet.data) {
                tracing::warn!(error = %err, "video dump write failed");
            }
            self.frames_written += 1;
        }
    }

    fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.write_all(&ANNEX_B_MARK);
        }
    }
}

/// Per-session dump state; disabled entirely when no path is configured.
#[derive(Default)]
pub struct StreamDump {
    audio: Option<AudioDump>,
    video: Option<VideoDump>,
}

impl StreamDump {
    pub fn from_config(config: &DumpConfig) -> Self {
        Self {
            audio: config
                .audio_path
                .clone()
                .map(|base| AudioDump::new(base, config.frame_limit)),
            video: config
                .video_path
                .clone()
                .map(|base| VideoDump::new(base, config.frame_limit)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.audio.is_some() || self.video.is_some()
    }

    pub fn on_audio_format(&mut self, codec: AudioCodec) {
        if let Some(audio) = self.audio.as_mut() {
            audio.on_format(codec);
        }
    }

    pub fn write_audio(&mut self, packet: &AudioPacket) {
        if let Some(audio) = self.audio.as_mut() {
            audio.write(packet);
        }
    }

    pub fn write_video(&mut self, packet: &VideoPacket) {
        if let Some(video) = self.video.as_mut() {
            video.write(packet);
        }
    }

    /// Close everything, finishing the video file with its end mark.
    pub fn close(&mut self) {
        if let Some(audio) = self.audio.as_mut() {
            audio.file = None;
        }
        if let Some(video) = self.video.as_mut() {
            video.close();
        }
    }
}
