//! Core types for the AirCast mirroring receiver.
//!
//! This crate holds the leaf building blocks the session controller is built
//! from: the clock synchronizer mapping sender timestamps onto the local
//! render clock, codec-aware delay compensation, port-set parsing, device
//! identity derivation, media packet types, DMAP metadata decoding, and the
//! receiver configuration surface.
//!
//! Everything here is transport- and renderer-agnostic; the service crate
//! (`aircast-receiver`) wires these pieces to a protocol engine and a render
//! pipeline.

pub mod config;
pub mod dmap;
pub mod identity;
pub mod media;
pub mod ports;
pub mod timing;

pub use config::{ConfigError, DisplayMode, ReceiverConfig};
pub use identity::DeviceId;
pub use media::{AudioCodec, AudioFormat, AudioPacket, MediaKind, VideoPacket};
pub use ports::{parse_port_set, PortSet, PORT_MAX, PORT_MIN};
pub use timing::clock::SharedClock;
pub use timing::delay::DelayPolicy;
