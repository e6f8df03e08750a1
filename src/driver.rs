//! Device driver handles consumed by the channel services.
//!
//! Drivers move bytes to and from hardware. They are shared between a
//! service's handle and its actor, so every method takes `&self` and
//! implementations keep their own interior state.

use std::sync::Arc;

use futures::future::BoxFuture;
use smol_str::SmolStr;
use tokio::sync::mpsc;

use crate::{
   channel::AudioStream,
   config::Config,
   error::Result,
   protocol::{ButtonCode, InputEvent, Timestamp, VideoFps, VideoResolution},
};

pub trait VideoOutput: Send + Sync {
   fn open(&self) -> bool;
   fn init(&self) -> bool;
   fn write(&self, timestamp: Timestamp, data: &[u8]);
   /// Must be safe to call when already stopped.
   fn stop(&self);

   fn resolution(&self) -> VideoResolution;
   fn fps(&self) -> VideoFps;
   /// Margins as `(width, height)`.
   fn margins(&self) -> (u32, u32);
   fn screen_dpi(&self) -> u32;
}

pub trait AudioOutput: Send + Sync {
   fn open(&self) -> bool;
   fn init(&self) -> bool;
   fn write(&self, timestamp: Timestamp, data: &[u8]);
   fn start(&self);
   fn suspend(&self);
   fn stop(&self);

   fn sample_rate(&self) -> u32;
   fn sample_size(&self) -> u32;
   fn channel_count(&self) -> u32;
}

pub trait AudioInput: Send + Sync {
   fn open(&self) -> bool;
   fn is_active(&self) -> bool;
   /// Starts capturing. Resolves once the device is recording.
   fn start(&self) -> BoxFuture<'static, Result<()>>;
   /// Resolves with the next captured chunk. Fails once capture stops.
   fn read(&self) -> BoxFuture<'static, Result<Vec<u8>>>;
   fn stop(&self);

   fn sample_rate(&self) -> u32;
   fn sample_size(&self) -> u32;
   fn channel_count(&self) -> u32;
}

pub trait InputDevice: Send + Sync {
   /// Starts delivering events into `events` until stopped.
   fn start(&self, events: mpsc::UnboundedSender<InputEvent>);
   fn stop(&self);

   fn supported_buttons(&self) -> Vec<ButtonCode>;
   fn has_touchscreen(&self) -> bool;
   /// Touch surface size as `(width, height)`.
   fn touchscreen_geometry(&self) -> (u32, u32);
}

pub trait BluetoothDevice: Send + Sync {
   fn stop(&self);
   fn is_available(&self) -> bool;
   fn local_address(&self) -> SmolStr;
   /// Looks up whether `address` is already paired. Never starts pairing.
   fn is_paired(&self, address: &str) -> BoxFuture<'static, bool>;
}

/// Produces drivers for a session, one set per call.
///
/// Device settings the services never look at are the driver's to read from
/// the snapshot: `video.omx_layer_index` for the video output,
/// `audio.output_backend` for audio outputs and `input.button_codes` for the
/// input device.
pub trait DriverFactory: Send + Sync {
   fn video_output(&self, config: &Config) -> Arc<dyn VideoOutput>;
   fn audio_output(&self, config: &Config, stream: AudioStream) -> Arc<dyn AudioOutput>;
   fn audio_input(&self, config: &Config) -> Arc<dyn AudioInput>;
   fn input_device(&self, config: &Config) -> Arc<dyn InputDevice>;
   /// The host's own adapter, if one was brought up.
   fn local_bluetooth(&self) -> Option<Arc<dyn BluetoothDevice>>;
}
