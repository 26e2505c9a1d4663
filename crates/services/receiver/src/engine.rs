//! Protocol engine abstraction.
//!
//! The engine terminates the control and data connections, performs the
//! cryptographic handshake, and hands decoded buffers and connection events
//! back through the [`EngineCallbacks`](crate::gateway::EngineCallbacks)
//! table. The controller only drives its lifecycle; it never sees the wire.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use aircast_core::config::{ConfigError, DisplayMode, ReceiverConfig};
use aircast_core::ports::PortSet;

use crate::gateway::EngineCallbacks;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to bind protocol engine: {0}")]
    Bind(String),

    #[error("protocol engine rejected configuration: {0}")]
    Configuration(String),

    #[error("protocol engine is not running")]
    NotRunning,
}

/// Everything the engine needs at start time.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    /// Display geometry hints forwarded to the sender; zero fields mean
    /// protocol defaults.
    pub display: DisplayMode,
    pub max_fps: u16,
    pub overscan: bool,

    pub ports: PortSet,

    /// Attached-client limit; a running session is protected from capture
    /// by a new client.
    pub max_clients: usize,

    /// Ask the sender for client-side FPS reports.
    pub show_client_fps: bool,

    /// Consecutive unanswered timing requests before the engine raises a
    /// reset event.
    pub ntp_timeout_limit: u32,

    /// Engine-side audio buffering delay, microseconds.
    pub audio_delay_us: Option<i64>,

    /// Debug-level logging inside the engine.
    pub debug_log: bool,
}

impl EngineSettings {
    /// Build engine settings from the validated receiver configuration.
    pub fn from_config(config: &ReceiverConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            display: config.display.resolve_mode()?,
            max_fps: config.display.max_fps,
            overscan: config.display.overscan,
            ports: config.port_set()?,
            max_clients: config.max_clients,
            show_client_fps: config.show_client_fps,
            ntp_timeout_limit: config.timeouts.ntp_timeout_limit,
            audio_delay_us: config.audio.engine_delay_us,
            debug_log: config.debug_log,
        })
    }
}

/// Lifecycle surface of the transport/protocol engine.
///
/// All methods are invoked from the controller task only; implementations
/// may block on network I/O.
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// Bind the configured (or auto-assigned) ports, register the callback
    /// table, and begin serving. Returns the stream port actually bound.
    async fn start(
        &self,
        settings: &EngineSettings,
        callbacks: Arc<dyn EngineCallbacks>,
    ) -> Result<u16, EngineError>;

    /// Stop the active client stream while keeping the binding; the reset
    /// path uses this before deciding how to resume.
    async fn stop_stream(&self);

    /// Rebind and resume serving with the already-registered callbacks,
    /// possibly on a newly assigned port. Used by the relaunch path, which
    /// keeps the existing advertisement.
    async fn restart(&self) -> Result<u16, EngineError>;

    /// Tear the engine down completely, releasing all ports.
    async fn shutdown(&self);

    /// Stream port currently bound, if running.
    fn port(&self) -> Option<u16>;
}

/// Control port companion to a stream port: the next port up, stepping
/// down instead when the stream port sits at the top of the range. Clients
/// expect the two to be adjacent.
pub fn default_control_port(stream_port: u16) -> u16 {
    if stream_port == aircast_core::ports::PORT_MAX {
        stream_port - 1
    } else {
        stream_port + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_from_default_config() {
        let config = ReceiverConfig::default();
        let settings = EngineSettings::from_config(&config).unwrap();
        assert_eq!(settings.ports, PortSet::auto());
        assert_eq!(settings.max_clients, 2);
        assert_eq!(settings.ntp_timeout_limit, 5);
        assert_eq!(settings.audio_delay_us, None);
    }

    #[test]
    fn settings_reject_bad_ports() {
        let mut config = ReceiverConfig::default();
        config.ports.tcp = "80".to_string();
        assert!(EngineSettings::from_config(&config).is_err());
    }

    #[test]
    fn control_port_is_adjacent() {
        assert_eq!(default_control_port(7100), 7101);
        assert_eq!(default_control_port(65535), 65534);
    }
}
