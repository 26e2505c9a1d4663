//! Service advertisement lifecycle.
//!
//! A session is visible to senders through two logical services: the
//! media-streaming endpoint and the discovery/control endpoint. From the
//! controller's perspective they publish as one atomic unit: when the
//! second registration fails the first is rolled back before the error
//! surfaces. Unpublishing is idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use mdns_sd::{ServiceDaemon, ServiceInfo};
use parking_lot::Mutex;
use thiserror::Error;

use aircast_core::identity::DeviceId;

/// Service type of the media-streaming endpoint.
pub const STREAM_SERVICE_TYPE: &str = "_raop._tcp.local.";
/// Service type of the discovery/control endpoint.
pub const CONTROL_SERVICE_TYPE: &str = "_airplay._tcp.local.";

#[derive(Debug, Error)]
pub enum AdvertiseError {
    /// No discovery responder is available on this host.
    #[error("no discovery responder available: {0}")]
    ResponderUnavailable(String),

    /// The responder refused a registration.
    #[error("{service} service registration rejected: {reason}")]
    Rejected {
        service: &'static str,
        reason: String,
    },
}

/// Registration surface of the discovery layer.
pub trait Advertiser: Send + Sync {
    fn register_stream_service(&self, port: u16) -> Result<(), AdvertiseError>;

    fn register_control_service(&self, port: u16) -> Result<(), AdvertiseError>;

    fn unregister_stream_service(&self);

    fn unregister_control_service(&self);
}

/// Publication state wrapper enforcing the atomic-publish / idempotent-
/// unpublish contract over any [`Advertiser`].
pub struct Advertisement {
    advertiser: Arc<dyn Advertiser>,
    published: bool,
    stream_port: u16,
    control_port: u16,
}

impl Advertisement {
    pub fn new(advertiser: Arc<dyn Advertiser>) -> Self {
        Self {
            advertiser,
            published: false,
            stream_port: 0,
            control_port: 0,
        }
    }

    /// Register both services. If the control registration fails, the
    /// stream registration is rolled back before the error returns.
    pub fn publish(&mut self, stream_port: u16, control_port: u16) -> Result<(), AdvertiseError> {
        self.advertiser.register_stream_service(stream_port)?;
        if let Err(err) = self.advertiser.register_control_service(control_port) {
            self.advertiser.unregister_stream_service();
            return Err(err);
        }
        self.published = true;
        self.stream_port = stream_port;
        self.control_port = control_port;
        tracing::info!(stream_port, control_port, "advertisement published");
        Ok(())
    }

    /// Re-register whichever service's port changed, keeping the
    /// advertisement itself alive. Used after the engine auto-assigns or
    /// rebinds ports.
    pub fn refresh(&mut self, stream_port: u16, control_port: u16) -> Result<(), AdvertiseError> {
        if !self.published {
            return Ok(());
        }
        if self.stream_port != stream_port {
            self.advertiser.unregister_stream_service();
            self.advertiser.register_stream_service(stream_port)?;
            self.stream_port = stream_port;
            tracing::info!(stream_port, "stream advertisement refreshed");
        }
        if self.control_port != control_port {
            self.advertiser.unregister_control_service();
            self.advertiser.register_control_service(control_port)?;
            self.control_port = control_port;
            tracing::info!(control_port, "control advertisement refreshed");
        }
        Ok(())
    }

    /// Unregister both services. Calling with nothing published is a
    /// no-op.
    pub fn unpublish(&mut self) {
        if !self.published {
            return;
        }
        self.advertiser.unregister_stream_service();
        self.advertiser.unregister_control_service();
        self.published = false;
        tracing::info!("advertisement unpublished");
    }

    pub fn is_published(&self) -> bool {
        self.published
    }
}

struct RegisteredNames {
    stream: Option<String>,
    control: Option<String>,
}

/// mDNS advertiser over the host's multicast-DNS responder.
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    name: String,
    identity: DeviceId,
    registered: Mutex<RegisteredNames>,
}

impl MdnsAdvertiser {
    pub fn new(name: &str, identity: DeviceId) -> Result<Self, AdvertiseError> {
        let daemon =
            ServiceDaemon::new().map_err(|e| AdvertiseError::ResponderUnavailable(e.to_string()))?;
        Ok(Self {
            daemon,
            name: name.to_string(),
            identity,
            registered: Mutex::new(RegisteredNames {
                stream: None,
                control: None,
            }),
        })
    }

    fn host_name(&self) -> String {
        let sanitized: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        format!("{sanitized}.local.")
    }

    fn register(
        &self,
        service: &'static str,
        service_type: &str,
        instance: &str,
        port: u16,
        txt: HashMap<String, String>,
    ) -> Result<String, AdvertiseError> {
        let info = ServiceInfo::new(service_type, instance, &self.host_name(), "", port, txt)
            .map_err(|e| AdvertiseError::Rejected {
                service,
                reason: e.to_string(),
            })?
            .enable_addr_auto();
        let fullname = info.get_fullname().to_string();
        self.daemon
            .register(info)
            .map_err(|e| AdvertiseError::Rejected {
                service,
                reason: e.to_string(),
            })?;
        Ok(fullname)
    }

    fn unregister(&self, fullname: Option<String>) {
        if let Some(fullname) = fullname {
            if let Err(err) = self.daemon.unregister(&fullname) {
                tracing::warn!(%fullname, error = %err, "mdns unregister failed");
            }
        }
    }
}

impl Advertiser for MdnsAdvertiser {
    fn register_stream_service(&self, port: u16) -> Result<(), AdvertiseError> {
        let instance = format!("{}@{}", self.identity.as_plain_hex(), self.name);
        let txt: HashMap<String, String> = [
            ("txtvers", "1"),
            ("ch", "2"),
            ("cn", "0,1,2,3"),
            ("et", "0,3,5"),
            ("sr", "44100"),
            ("ss", "16"),
            ("tp", "UDP"),
            ("vn", "65537"),
            ("md", "0,1,2"),
            ("da", "true"),
            ("am", "AirCast1,1"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let fullname = self.register("stream", STREAM_SERVICE_TYPE, &instance, port, txt)?;
        self.registered.lock().stream = Some(fullname);
        Ok(())
    }

    fn register_control_service(&self, port: u16) -> Result<(), AdvertiseError> {
        let deviceid = self.identity.to_string();
        let txt: HashMap<String, String> = [
            ("deviceid", deviceid.as_str()),
            ("features", "0x5A7FFFF7,0x1E"),
            ("model", "AirCast1,1"),
            ("flags", "0x4"),
            ("vv", "2"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let fullname = self.register("control", CONTROL_SERVICE_TYPE, &self.name, port, txt)?;
        self.registered.lock().control = Some(fullname);
        Ok(())
    }

    fn unregister_stream_service(&self) {
        let fullname = self.registered.lock().stream.take();
        self.unregister(fullname);
    }

    fn unregister_control_service(&self) {
        let fullname = self.registered.lock().control.take();
        self.unregister(fullname);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingAdvertiser {
        fail_control: AtomicBool,
        stream_registered: AtomicBool,
        control_registered: AtomicBool,
    }

    impl Advertiser for RecordingAdvertiser {
        fn register_stream_service(&self, _port: u16) -> Result<(), AdvertiseError> {
            self.stream_registered.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn register_control_service(&self, _port: u16) -> Result<(), AdvertiseError> {
            if self.fail_control.load(Ordering::SeqCst) {
                return Err(AdvertiseError::Rejected {
                    service: "control",
                    reason: "refused".into(),
                });
            }
            self.control_registered.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn unregister_stream_service(&self) {
            self.stream_registered.store(false, Ordering::SeqCst);
        }

        fn unregister_control_service(&self) {
            self.control_registered.store(false, Ordering::SeqCst);
        }
    }

    #[test]
    fn publish_registers_both_services() {
        let advertiser = Arc::new(RecordingAdvertiser::default());
        let mut advertisement = Advertisement::new(advertiser.clone());

        advertisement.publish(7100, 7101).unwrap();
        assert!(advertisement.is_published());
        assert!(advertiser.stream_registered.load(Ordering::SeqCst));
        assert!(advertiser.control_registered.load(Ordering::SeqCst));
    }

    #[test]
    fn control_failure_rolls_back_stream() {
        let advertiser = Arc::new(RecordingAdvertiser::default());
        advertiser.fail_control.store(true, Ordering::SeqCst);
        let mut advertisement = Advertisement::new(advertiser.clone());

        assert!(advertisement.publish(7100, 7101).is_err());
        assert!(!advertisement.is_published());
        assert!(!advertiser.stream_registered.load(Ordering::SeqCst));
    }

    #[test]
    fn unpublish_is_idempotent() {
        let advertiser = Arc::new(RecordingAdvertiser::default());
        let mut advertisement = Advertisement::new(advertiser.clone());

        advertisement.unpublish();

        advertisement.publish(7100, 7101).unwrap();
        advertisement.unpublish();
        assert!(!advertisement.is_published());
        advertisement.unpublish();
    }

    #[test]
    fn refresh_reregisters_only_changed_ports() {
        let advertiser = Arc::new(RecordingAdvertiser::default());
        let mut advertisement = Advertisement::new(advertiser.clone());

        advertisement.publish(7100, 7101).unwrap();
        advertisement.refresh(7100, 7101).unwrap();
        advertisement.refresh(7200, 7201).unwrap();
        assert!(advertiser.stream_registered.load(Ordering::SeqCst));
        assert!(advertiser.control_registered.load(Ordering::SeqCst));
    }

    #[test]
    fn refresh_before_publish_is_a_no_op() {
        let advertiser = Arc::new(RecordingAdvertiser::default());
        let mut advertisement = Advertisement::new(advertiser.clone());

        advertisement.refresh(7100, 7101).unwrap();
        assert!(!advertiser.stream_registered.load(Ordering::SeqCst));
    }
}
