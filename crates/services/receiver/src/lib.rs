//! AirCast mirroring receiver: session lifecycle and timing
//! synchronization controller.
//!
//! The receiver owns one streaming session with a remote sender. It
//! advertises the service, drives the protocol engine's lifecycle, funnels
//! the engine's callbacks through a single controller task, keeps the
//! sender's clock mapped onto local render time, and decides when to
//! relaunch, reconnect, or tear the session down.
//!
//! The protocol engine, the audio/video renderers, and (optionally) the
//! discovery responder are supplied by the host through traits:
//!
//! ```ignore
//! let config = ReceiverConfig::from_toml_file("aircast.toml")?;
//! let handle = Receiver::builder(config, engine)
//!     .audio_renderer(audio)
//!     .video_factory(video_factory)
//!     .spawn()?;
//!
//! let mut status = handle.subscribe();
//! // ... handle.stop() on shutdown; handle.join().await for the result.
//! ```

pub mod advertise;
pub mod dump;
pub mod engine;
pub mod gateway;
pub mod metrics;
pub mod notify;
pub mod render;
pub mod session;

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};

use aircast_core::config::{ConfigError, ReceiverConfig};
use aircast_core::identity::DeviceId;
use aircast_core::SharedClock;

use crate::advertise::{AdvertiseError, Advertisement, Advertiser, MdnsAdvertiser};
use crate::dump::StreamDump;
use crate::engine::{EngineError, EngineSettings, ProtocolEngine};
use crate::gateway::SessionGateway;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::notify::{StatusHub, StatusNotification};
use crate::render::{AudioRenderer, RenderError, VideoRendererFactory, VideoSlot};
use crate::session::{ControlEvent, Session, SessionController};

/// Errors fatal to session start (and to the reconnect path, which repeats
/// it).
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Advertise(#[from] AdvertiseError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("controller task terminated abnormally")]
    Terminated,
}

/// Builder wiring the receiver's collaborators together.
pub struct ReceiverBuilder {
    config: ReceiverConfig,
    engine: Arc<dyn ProtocolEngine>,
    audio: Option<Arc<dyn AudioRenderer>>,
    video_factory: Option<Arc<dyn VideoRendererFactory>>,
    advertiser: Option<Arc<dyn Advertiser>>,
    status: Option<StatusHub>,
}

impl ReceiverBuilder {
    pub fn audio_renderer(mut self, audio: Arc<dyn AudioRenderer>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn video_factory(mut self, factory: Arc<dyn VideoRendererFactory>) -> Self {
        self.video_factory = Some(factory);
        self
    }

    /// Override the discovery layer; without this an mDNS advertiser is
    /// created on the host's responder.
    pub fn advertiser(mut self, advertiser: Arc<dyn Advertiser>) -> Self {
        self.advertiser = Some(advertiser);
        self
    }

    /// Provide the status hub up front, so subscriptions made before
    /// [`spawn`](ReceiverBuilder::spawn) see every notification from the
    /// first transition on.
    pub fn status_hub(mut self, status: StatusHub) -> Self {
        self.status = Some(status);
        self
    }

    /// Validate the configuration, build the session wiring, and spawn the
    /// controller task.
    ///
    /// Configuration errors are rejected here, before any resource is
    /// acquired; advertisement and engine failures surface through
    /// [`ReceiverHandle::join`].
    pub fn spawn(self) -> Result<ReceiverHandle, StartError> {
        self.config.validate()?;
        let settings = EngineSettings::from_config(&self.config)?;

        let identity = if self.config.random_identity {
            let id = DeviceId::random();
            tracing::info!(identity = %id, "using randomly generated hardware address");
            id
        } else {
            DeviceId::detect()
        };

        let advertiser: Arc<dyn Advertiser> = match self.advertiser {
            Some(advertiser) => advertiser,
            None => Arc::new(MdnsAdvertiser::new(&self.config.name, identity)?),
        };

        let audio = if self.config.audio.enabled {
            self.audio
        } else {
            None
        };
        let video_factory = if self.config.video.enabled {
            self.video_factory
        } else {
            None
        };

        let clock = Arc::new(SharedClock::new());
        let status = self.status.unwrap_or_default();
        let metrics = Arc::new(Metrics::new());
        let dump = Arc::new(Mutex::new(StreamDump::from_config(&self.config.dump)));
        let video_slot = Arc::new(VideoSlot::new());

        // The initial render surface exists before the first client
        // attaches.
        if let Some(factory) = video_factory.as_ref() {
            video_slot.replace(Some(factory.create(&self.config.video)?));
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let gateway = Arc::new(SessionGateway::new(
            control_tx.clone(),
            Arc::clone(&clock),
            self.config.delay_policy(),
            audio.clone(),
            Arc::clone(&video_slot),
            video_factory.is_some(),
            Arc::clone(&dump),
            status.clone(),
            Arc::clone(&metrics),
            self.config.audio.cover_art_path.clone(),
        ));

        let controller = SessionController {
            config: self.config,
            identity,
            settings,
            engine: self.engine,
            callbacks: gateway,
            advertisement: Advertisement::new(advertiser),
            audio: audio.clone(),
            video_slot,
            video_factory,
            clock,
            dump,
            status: status.clone(),
            metrics: Arc::clone(&metrics),
            control_rx,
            stop_rx,
            session: Session::new(),
        };

        let task = tokio::spawn(controller.run());

        Ok(ReceiverHandle {
            stop_tx,
            control_tx,
            status,
            metrics,
            audio,
            task,
        })
    }
}

/// Entry point; see the crate docs.
pub struct Receiver;

impl Receiver {
    pub fn builder(config: ReceiverConfig, engine: Arc<dyn ProtocolEngine>) -> ReceiverBuilder {
        ReceiverBuilder {
            config,
            engine,
            audio: None,
            video_factory: None,
            advertiser: None,
            status: None,
        }
    }
}

/// Handle to a running receiver.
pub struct ReceiverHandle {
    stop_tx: watch::Sender<bool>,
    control_tx: mpsc::UnboundedSender<ControlEvent>,
    status: StatusHub,
    metrics: Arc<Metrics>,
    audio: Option<Arc<dyn AudioRenderer>>,
    task: tokio::task::JoinHandle<Result<(), StartError>>,
}

impl ReceiverHandle {
    /// Request a clean shutdown. Pre-empts any pending reset or relaunch;
    /// the run loop exits within its poll interval.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Restart the protocol engine and render pipeline while keeping the
    /// service advertisement.
    pub fn relaunch(&self) {
        let _ = self.control_tx.send(ControlEvent::RelaunchRequested);
    }

    pub fn set_volume(&self, volume: f32) {
        if let Some(audio) = self.audio.as_ref() {
            audio.set_volume(volume);
        }
    }

    /// Subscribe to lifecycle status notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusNotification> {
        self.status.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Wait for the controller task to finish and return its result.
    pub async fn join(self) -> Result<(), StartError> {
        match self.task.await {
            Ok(result) => result,
            Err(_) => Err(StartError::Terminated),
        }
    }
}
