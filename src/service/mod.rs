//! Per-channel protocol services.
//!
//! Each service owns one multiplexed channel and the driver behind it, and
//! runs its state machine on its own actor (see [`runtime`]). A session
//! starts, stops and queries them through the [`Service`] trait only.

pub mod audio;
pub mod audio_input;
pub mod bluetooth;
pub mod factory;
pub mod input;
pub(crate) mod runtime;
pub mod video;

use crate::protocol::ServiceDiscoveryResponse;

pub use audio::AudioService;
pub use audio_input::AudioInputService;
pub use bluetooth::BluetoothService;
pub use factory::ServiceFactory;
pub use input::InputService;
pub use video::VideoService;

/// A channel service as seen by the session that owns it.
pub trait Service: Send + Sync {
   /// Arms the first receive. Nothing happens on the channel before this.
   fn start(&self);

   /// Halts the driver. Safe to call repeatedly.
   fn stop(&self);

   /// Appends this service's channel description. Does not touch channel state.
   fn fill_features(&self, response: &mut ServiceDiscoveryResponse);
}

/// Ordered set of services making up one session.
pub type ServiceList = Vec<Box<dyn Service>>;
