//! Timing synchronization for decoded media buffers.
//!
//! Two stages run on every packet before it reaches a renderer:
//!
//! 1. [`clock::SharedClock`] maps the sender's timestamp domain onto the
//!    local render clock with a single per-session offset shared by audio
//!    and video (lip sync depends on both paths using the same offset).
//! 2. [`delay::DelayPolicy`] adds the configured per-media-type delay on
//!    top of the synchronized timestamp.

pub mod clock;
pub mod delay;
