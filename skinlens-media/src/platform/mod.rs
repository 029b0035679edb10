//! Platform implementations of the device and sink boundaries
//!
//! `mock` is always available and fully scriptable. `native` drives a real
//! camera through nokhwa and is gated behind the `native` feature.

pub mod mock;
#[cfg(feature = "native")]
pub mod native;

pub use mock::{MockCameraBehavior, MockMediaDevices, MockMediaStream, MockVideoSink};
#[cfg(feature = "native")]
pub use native::{NativeMediaDevices, NativeVideoSink};
