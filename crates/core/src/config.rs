//! Receiver configuration.
//!
//! Loaded from TOML with per-section defaults, so an empty file (or no file
//! at all) yields a working receiver. Validation of ports and display
//! geometry happens before any resource is acquired.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::{PortError, PortSet};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid display mode '{0}', expected WIDTHxHEIGHT[@RATE]")]
    InvalidDisplayMode(String),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Requested display geometry, `WIDTHxHEIGHT[@RATE]`.
///
/// Width and height are at most four digits and nonzero; the refresh rate is
/// optional, nonzero and fits in a byte. These are hints forwarded to the
/// sender, `0` meaning protocol default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMode {
    pub width: u16,
    pub height: u16,
    pub refresh_rate: u16,
}

impl Default for DisplayMode {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            refresh_rate: 0,
        }
    }
}

impl FromStr for DisplayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ConfigError::InvalidDisplayMode(s.to_string());

        let (w_str, rest) = s.split_once('x').ok_or_else(err)?;
        let (h_str, r_str) = match rest.split_once('@') {
            Some((h, r)) => (h, Some(r)),
            None => (rest, None),
        };

        let parse_dim = |text: &str, max_len: usize| -> Result<u16, ConfigError> {
            if text.is_empty() || text.len() > max_len || !text.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(err());
            }
            let v: u32 = text.parse().map_err(|_| err())?;
            if v == 0 || v > u16::MAX as u32 {
                return Err(err());
            }
            Ok(v as u16)
        };

        let width = parse_dim(w_str, 4)?;
        let height = parse_dim(h_str, 4)?;
        let refresh_rate = match r_str {
            Some(r) => {
                let v = parse_dim(r, 3)?;
                if v > 255 {
                    return Err(err());
                }
                v
            }
            None => 0,
        };

        Ok(Self {
            width,
            height,
            refresh_rate,
        })
    }
}

/// Video mirror/flip selection, configured as `I`, `H` or `V`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFlip {
    #[default]
    None,
    Invert,
    Horizontal,
    Vertical,
}

impl FromStr for VideoFlip {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" => Ok(Self::Invert),
            "H" => Ok(Self::Horizontal),
            "V" => Ok(Self::Vertical),
            other => Err(ConfigError::InvalidDisplayMode(other.to_string())),
        }
    }
}

/// Video rotation selection, configured as `L` or `R`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoRotate {
    #[default]
    None,
    Left,
    Right,
}

impl FromStr for VideoRotate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" => Ok(Self::Left),
            "R" => Ok(Self::Right),
            other => Err(ConfigError::InvalidDisplayMode(other.to_string())),
        }
    }
}

/// Display hints sent to the client at negotiation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// `WIDTHxHEIGHT[@RATE]`; absent means protocol defaults
    /// (1920x1080@60).
    pub mode: Option<String>,

    /// Maximum mirroring frame rate hint, `0` for default.
    pub max_fps: u16,

    /// Advertise the display as overscanned.
    pub overscan: bool,
}

impl DisplayConfig {
    pub fn resolve_mode(&self) -> Result<DisplayMode, ConfigError> {
        match &self.mode {
            Some(text) => text.parse(),
            None => Ok(DisplayMode::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    /// Comma-separated TCP triple, e.g. `"7100,7101,7102"`. Empty means
    /// fully auto-assigned.
    pub tcp: String,

    /// Comma-separated UDP triple.
    pub udp: String,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            tcp: String::new(),
            udp: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,

    /// Delay for ALAC audio, microseconds (signed).
    pub delay_alac_us: i64,

    /// Delay for AAC and other audio codecs, microseconds (signed).
    pub delay_aac_us: i64,

    /// Engine-side audio buffering delay forwarded to the sender,
    /// microseconds. Unset leaves the engine default.
    pub engine_delay_us: Option<i64>,

    /// When set, received cover art is written to this file.
    pub cover_art_path: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_alac_us: 0,
            delay_aac_us: 0,
            engine_delay_us: None,
            cover_art_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub enabled: bool,

    /// Destroy the render surface on disconnect rather than leaving the
    /// last frame frozen on screen. A reset event's reset-video flag
    /// overrides this per incident.
    pub close_window_on_disconnect: bool,

    pub fullscreen: bool,
    pub flip: VideoFlip,
    pub rotate: VideoRotate,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            close_window_on_disconnect: true,
            fullscreen: false,
            flip: VideoFlip::None,
            rotate: VideoRotate::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Consecutive unanswered timing requests before the engine declares
    /// the client lost and raises a reset event.
    pub ntp_timeout_limit: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ntp_timeout_limit: 5,
        }
    }
}

/// Diagnostic raw-stream dumping. Off unless a path is configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    /// Base path for audio dump files; codec-derived suffixes are appended.
    pub audio_path: Option<PathBuf>,

    /// Base path for video dump files; `.h264` is appended.
    pub video_path: Option<PathBuf>,

    /// Frames per file before rotation; `0` for a single unbounded file.
    pub frame_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Advertised service name.
    pub name: String,

    /// Maximum simultaneously attached clients. Kept small to protect a
    /// running session from capture by a new client.
    pub max_clients: usize,

    /// Use a random device identity instead of an interface address.
    pub random_identity: bool,

    /// Report client-side FPS data when the sender offers it.
    pub show_client_fps: bool,

    /// Ask the protocol engine for debug-level logging.
    pub debug_log: bool,

    pub display: DisplayConfig,
    pub ports: PortsConfig,
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub timeouts: TimeoutConfig,
    pub dump: DumpConfig,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            name: "AirCast".to_string(),
            max_clients: 2,
            random_identity: false,
            show_client_fps: false,
            debug_log: true,
            display: DisplayConfig::default(),
            ports: PortsConfig::default(),
            audio: AudioConfig::default(),
            video: VideoConfig::default(),
            timeouts: TimeoutConfig::default(),
            dump: DumpConfig::default(),
        }
    }
}

impl ReceiverConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate the configured port triples.
    pub fn port_set(&self) -> Result<PortSet, ConfigError> {
        Ok(PortSet::parse(&self.ports.tcp, &self.ports.udp)?)
    }

    /// Validate everything that must be rejected before resources are
    /// acquired.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.port_set()?;
        self.display.resolve_mode()?;
        Ok(())
    }

    /// The configured delay policy for the media path.
    pub fn delay_policy(&self) -> crate::timing::delay::DelayPolicy {
        crate::timing::delay::DelayPolicy {
            audio_alac_us: self.audio.delay_alac_us,
            audio_aac_us: self.audio.delay_aac_us,
            video_us: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = ReceiverConfig::default();
        assert_eq!(config.name, "AirCast");
        assert_eq!(config.max_clients, 2);
        assert!(config.video.close_window_on_disconnect);
        assert_eq!(config.timeouts.ntp_timeout_limit, 5);
        config.validate().unwrap();
        assert_eq!(config.port_set().unwrap(), PortSet::auto());
    }

    #[test]
    fn empty_toml_is_defaults() {
        let config = ReceiverConfig::from_toml_str("").unwrap();
        assert_eq!(config.name, "AirCast");
        assert!(config.audio.enabled);
    }

    #[test]
    fn toml_sections_override() {
        let config = ReceiverConfig::from_toml_str(
            r#"
            name = "LivingRoom"

            [ports]
            tcp = "7100"
            udp = "6000,6001,6002"

            [audio]
            delay_alac_us = 250000

            [video]
            close_window_on_disconnect = false

            [display]
            mode = "1280x720@60"
            max_fps = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "LivingRoom");
        assert_eq!(config.audio.delay_alac_us, 250_000);
        assert!(!config.video.close_window_on_disconnect);

        let ports = config.port_set().unwrap();
        assert_eq!(ports.tcp, [7100, 7101, 7102]);
        assert_eq!(ports.udp, [6000, 6001, 6002]);

        let mode = config.display.resolve_mode().unwrap();
        assert_eq!(
            mode,
            DisplayMode {
                width: 1280,
                height: 720,
                refresh_rate: 60
            }
        );
    }

    #[test]
    fn invalid_ports_fail_validation() {
        let config = ReceiverConfig::from_toml_str("[ports]\ntcp = \"80\"\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Port(_))));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aircast.toml");
        std::fs::write(&path, "name = \"Den\"\n").unwrap();

        let config = ReceiverConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.name, "Den");

        let missing = ReceiverConfig::from_toml_file(dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn display_mode_parsing() {
        assert_eq!(
            "1920x1080@60".parse::<DisplayMode>().unwrap(),
            DisplayMode {
                width: 1920,
                height: 1080,
                refresh_rate: 60
            }
        );
        assert_eq!(
            "640x480".parse::<DisplayMode>().unwrap(),
            DisplayMode {
                width: 640,
                height: 480,
                refresh_rate: 0
            }
        );

        for bad in ["1920", "x1080", "1920x", "0x1080", "1920x1080@0", "1920x1080@1000",
            "-640x480", "19200x1080", "1920x1080@abc"]
        {
            assert!(bad.parse::<DisplayMode>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn flip_and_rotate_letters() {
        assert_eq!("H".parse::<VideoFlip>().unwrap(), VideoFlip::Horizontal);
        assert_eq!("V".parse::<VideoFlip>().unwrap(), VideoFlip::Vertical);
        assert_eq!("I".parse::<VideoFlip>().unwrap(), VideoFlip::Invert);
        assert!("X".parse::<VideoFlip>().is_err());

        assert_eq!("L".parse::<VideoRotate>().unwrap(), VideoRotate::Left);
        assert_eq!("R".parse::<VideoRotate>().unwrap(), VideoRotate::Right);
        assert!("U".parse::<VideoRotate>().is_err());
    }

    #[test]
    fn delay_policy_from_config() {
        let mut config = ReceiverConfig::default();
        config.audio.delay_alac_us = 100;
        config.audio.delay_aac_us = -200;
        let policy = config.delay_policy();
        assert_eq!(policy.audio_alac_us, 100);
        assert_eq!(policy.audio_aac_us, -200);
        assert_eq!(policy.video_us, 0);
    }
}
