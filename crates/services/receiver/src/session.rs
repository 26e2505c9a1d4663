//! Session lifecycle state machine.
//!
//! One controller task owns the session. Connection events arrive from the
//! gateway on a single-consumer channel, stop requests on a watch channel,
//! and every state transition is announced through the status hub. The
//! serve loop re-checks its exit flags on a short poll interval, so a stop
//! is observed within a bounded delay even if no event wakes it.
//!
//! The restart flow is an explicit state machine: a client reset either
//! resumes the stream on the kept advertisement (relaunch) or tears both
//! advertisement and engine down and starts over (reconnect). A stop always
//! wins over any pending reset or relaunch decision.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use aircast_core::config::ReceiverConfig;
use aircast_core::identity::DeviceId;
use aircast_core::SharedClock;

use crate::advertise::Advertisement;
use crate::dump::StreamDump;
use crate::engine::{default_control_port, EngineSettings, ProtocolEngine};
use crate::gateway::EngineCallbacks;
use crate::metrics::Metrics;
use crate::notify::{StatusEvent, StatusHub};
use crate::render::{AudioRenderer, VideoRendererFactory, VideoSlot};
use crate::StartError;

/// Bound on how late a stop or pending reset is observed by the serve loop.
const LOOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Advertising,
    Running,
    Resetting,
    Relaunching,
    Reconnecting,
    ShuttingDown,
}

/// Events funneled from the gateway into the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    ClientConnected,
    ClientDisconnected,
    ConnectionReset {
        timeout_count: u32,
        reset_video: bool,
    },
    ConnectionTeardown {
        teardown_96: bool,
        teardown_110: bool,
    },
    RelaunchRequested,
}

/// Mutable session state, owned exclusively by the controller task.
#[derive(Debug)]
pub(crate) struct Session {
    pub state: SessionState,
    pub open_connections: u32,
    /// Whether the render surface is destroyed on disconnect or left
    /// showing the last frame. Seeded from configuration at every serve
    /// loop entry; a reset event's reset-video flag overrides it.
    pub close_window: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            open_connections: 0,
            close_window: true,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of one serve-loop pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// Tear everything down; terminal.
    Stop,
    /// Full restart of advertisement and engine.
    Reconnect,
    /// Restart the stream on the kept advertisement. `stop_stream` is set
    /// for host-requested relaunches; reset and teardown paths arrive with
    /// the stream already stopped.
    Resume { stop_stream: bool },
}

/// Arbitrate the exit flags. Stop always wins: a pending reset or relaunch
/// never survives a stop request.
fn evaluate_exit(
    stop: bool,
    reset_pending: bool,
    relaunch_requested: bool,
    relaunch_armed: bool,
) -> LoopExit {
    if stop {
        return LoopExit::Stop;
    }
    if reset_pending {
        return if relaunch_armed {
            LoopExit::Resume { stop_stream: false }
        } else {
            LoopExit::Reconnect
        };
    }
    if relaunch_requested {
        return LoopExit::Resume { stop_stream: true };
    }
    // No flag set means the control channel closed under us.
    LoopExit::Stop
}

pub(crate) struct SessionController {
    pub(crate) config: ReceiverConfig,
    pub(crate) identity: DeviceId,
    pub(crate) settings: EngineSettings,
    pub(crate) engine: Arc<dyn ProtocolEngine>,
    pub(crate) callbacks: Arc<dyn EngineCallbacks>,
    pub(crate) advertisement: Advertisement,
    pub(crate) audio: Option<Arc<dyn AudioRenderer>>,
    pub(crate) video_slot: Arc<VideoSlot>,
    pub(crate) video_factory: Option<Arc<dyn VideoRendererFactory>>,
    pub(crate) clock: Arc<SharedClock>,
    pub(crate) dump: Arc<Mutex<StreamDump>>,
    pub(crate) status: StatusHub,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) control_rx: mpsc::UnboundedReceiver<ControlEvent>,
    pub(crate) stop_rx: watch::Receiver<bool>,
    pub(crate) session: Session,
}

impl SessionController {
    pub(crate) async fn run(mut self) -> Result<(), StartError> {
        tracing::info!(name = %self.config.name, identity = %self.identity, "receiver starting");

        if let Err(err) = self.start_services().await {
            tracing::error!(error = %err, "session start failed");
            self.fail_cleanup().await;
            return Err(err);
        }

        loop {
            match self.serve().await {
                LoopExit::Stop => {
                    self.shutdown().await;
                    return Ok(());
                }
                LoopExit::Reconnect => {
                    if let Err(err) = self.reconnect().await {
                        tracing::error!(error = %err, "reconnect failed");
                        self.fail_cleanup().await;
                        return Err(err);
                    }
                }
                LoopExit::Resume { stop_stream } => {
                    if let Err(err) = self.resume(stop_stream).await {
                        tracing::error!(error = %err, "relaunch failed");
                        self.fail_cleanup().await;
                        return Err(err);
                    }
                }
            }
        }
    }

    fn video_enabled(&self) -> bool {
        self.video_factory.is_some()
    }

    fn transition(&mut self, state: SessionState) {
        tracing::debug!(from = ?self.session.state, to = ?state, "state transition");
        self.session.state = state;
    }

    fn control_port_for(&self, stream_port: u16) -> u16 {
        let configured = self.settings.ports.tcp[2];
        if configured != 0 {
            configured
        } else {
            default_control_port(stream_port)
        }
    }

    /// Publish the advertisement, then start the engine. Either failure
    /// rolls back whatever is already up before the error returns.
    async fn start_services(&mut self) -> Result<(), StartError> {
        self.transition(SessionState::Advertising);

        let tcp = self.settings.ports.tcp;
        let control_hint = if tcp[2] != 0 {
            tcp[2]
        } else if tcp[0] != 0 {
            default_control_port(tcp[0])
        } else {
            0
        };
        self.advertisement.publish(tcp[0], control_hint)?;

        let port = match self
            .engine
            .start(&self.settings, Arc::clone(&self.callbacks))
            .await
        {
            Ok(port) => port,
            Err(err) => {
                self.advertisement.unpublish();
                return Err(err.into());
            }
        };
        tracing::info!(port, "protocol engine started");

        // Auto-assigned ports only become known once the engine is up.
        let control_port = self.control_port_for(port);
        if let Err(err) = self.advertisement.refresh(port, control_port) {
            self.engine.shutdown().await;
            self.advertisement.unpublish();
            return Err(err.into());
        }
        Ok(())
    }

    /// The serve loop: process control events until an exit is scheduled.
    async fn serve(&mut self) -> LoopExit {
        self.session.close_window = self.config.video.close_window_on_disconnect;
        self.transition(SessionState::Running);
        self.status.emit(StatusEvent::MainLoopStarted, "");

        let relaunch_armed = self.video_enabled();
        let mut stop = *self.stop_rx.borrow_and_update();
        let mut reset_pending = false;
        let mut relaunch_requested = false;
        let mut tick = tokio::time::interval(LOOP_POLL_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while !(stop || reset_pending || relaunch_requested) {
            tokio::select! {
                event = self.control_rx.recv() => match event {
                    Some(event) => {
                        self.handle_event(event, &mut reset_pending, &mut relaunch_requested)
                            .await;
                    }
                    None => stop = true,
                },
                changed = self.stop_rx.changed() => {
                    stop = changed.map(|_| *self.stop_rx.borrow_and_update()).unwrap_or(true);
                }
                _ = tick.tick() => {}
            }
        }

        self.status.emit(StatusEvent::MainLoopStopped, "");

        // A stop that raced the loop exit still wins the arbitration.
        stop = stop || *self.stop_rx.borrow();
        evaluate_exit(stop, reset_pending, relaunch_requested, relaunch_armed)
    }

    async fn handle_event(
        &mut self,
        event: ControlEvent,
        reset_pending: &mut bool,
        relaunch_requested: &mut bool,
    ) {
        match event {
            ControlEvent::ClientConnected => {
                self.session.open_connections += 1;
                tracing::info!(
                    open_connections = self.session.open_connections,
                    "client connected"
                );
                self.status.emit(StatusEvent::Connect, "");
            }
            ControlEvent::ClientDisconnected => {
                self.session.open_connections = self.session.open_connections.saturating_sub(1);
                tracing::info!(
                    open_connections = self.session.open_connections,
                    "client disconnected"
                );
                if self.session.open_connections == 0 {
                    self.clock.reset();
                }
                self.status.emit(StatusEvent::ConnectionClosed, "");
            }
            ControlEvent::ConnectionReset {
                timeout_count,
                reset_video,
            } => {
                self.metrics.reset();
                tracing::warn!("lost connection with client (network problem?)");
                if timeout_count > 0 {
                    tracing::info!(
                        timeout_count,
                        limit = self.config.timeouts.ntp_timeout_limit,
                        "client no-response timeout limit reached; the connection \
                         sometimes recovers after a longer delay"
                    );
                }
                self.session.close_window = reset_video;
                self.engine.stop_stream().await;
                self.transition(SessionState::Resetting);
                *reset_pending = true;
                self.status.emit(StatusEvent::ConnectionReset, "");
            }
            ControlEvent::ConnectionTeardown {
                teardown_96,
                teardown_110,
            } => {
                self.metrics.teardown();
                tracing::debug!(teardown_96, teardown_110, "connection teardown");
                // The client already tore its stream down; with the
                // surface-close policy active this only schedules a loop
                // exit.
                if teardown_110 && self.session.close_window {
                    self.transition(SessionState::Resetting);
                    *reset_pending = true;
                }
                self.status.emit(StatusEvent::ConnectionTeardown, "");
            }
            ControlEvent::RelaunchRequested => {
                self.transition(SessionState::Relaunching);
                *relaunch_requested = true;
            }
        }
    }

    fn recreate_video_surface(&mut self) {
        let Some(factory) = self.video_factory.as_ref() else {
            return;
        };
        // Destroy the old surface before creating its replacement.
        self.video_slot.replace(None);
        match factory.create(&self.config.video) {
            Ok(renderer) => self.video_slot.replace(Some(renderer)),
            Err(err) => {
                tracing::error!(error = %err, "video surface recreation failed");
            }
        }
    }

    /// Restart the stream on the kept advertisement.
    async fn resume(&mut self, stop_stream: bool) -> Result<(), StartError> {
        if stop_stream {
            self.transition(SessionState::Relaunching);
            self.engine.stop_stream().await;
        }
        self.metrics.relaunch();

        if let Some(audio) = self.audio.as_ref() {
            audio.stop();
        }
        if self.video_enabled() && self.session.close_window {
            self.recreate_video_surface();
        }

        let port = self.engine.restart().await?;
        let control_port = self.control_port_for(port);
        if let Err(err) = self.advertisement.refresh(port, control_port) {
            tracing::warn!(error = %err, "could not refresh advertisement after relaunch");
        }
        tracing::info!(port, "stream relaunched");
        Ok(())
    }

    /// Full restart: advertisement and engine both come down and back up.
    async fn reconnect(&mut self) -> Result<(), StartError> {
        self.transition(SessionState::Reconnecting);
        self.metrics.reconnect();
        tracing::info!("restarting advertisement and protocol engine");

        self.engine.shutdown().await;
        self.advertisement.unpublish();

        if let Some(audio) = self.audio.as_ref() {
            audio.stop();
        }
        if self.video_enabled() && self.session.close_window {
            self.recreate_video_surface();
        }

        self.start_services().await
    }

    /// Ordered teardown: engine, advertisement, renderers, dump handles.
    async fn shutdown(&mut self) {
        self.transition(SessionState::ShuttingDown);
        tracing::info!("stopping");

        self.engine.shutdown().await;
        self.advertisement.unpublish();

        if let Some(audio) = self.audio.as_ref() {
            audio.stop();
        }
        self.video_slot.replace(None);

        self.dump.lock().close();
        if let Some(path) = self.config.audio.cover_art_path.as_deref() {
            let _ = std::fs::remove_file(path);
        }

        let uptime = Utc::now() - self.session.created_at;
        tracing::info!(uptime_secs = uptime.num_seconds(), "receiver stopped");
        self.status.emit(StatusEvent::Stopped, "");
        self.transition(SessionState::Idle);
    }

    /// Cleanup after a failed start or restart; resources may be partially
    /// up, and every teardown step tolerates that.
    async fn fail_cleanup(&mut self) {
        self.engine.shutdown().await;
        self.advertisement.unpublish();
        if let Some(audio) = self.audio.as_ref() {
            audio.stop();
        }
        self.video_slot.replace(None);
        self.dump.lock().close();
        self.status.emit(StatusEvent::Stopped, "start failed");
        self.transition(SessionState::Idle);
    }
}
