//! Channel abstraction over the message multiplexing substrate.
//!
//! A `Channel` carries one function's typed messages. `receive` is
//! single-shot and has to be issued again after every message; `send`
//! resolves once the substrate has written the message out.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::{
   error::Result,
   protocol::{
      AudioInbound, AudioOutbound, AvInputInbound, AvInputOutbound, BluetoothInbound,
      BluetoothOutbound, ChannelId, ControlInbound, ControlOutbound, InputInbound, InputOutbound,
      VideoInbound, VideoOutbound,
   },
};

/// One multiplexed channel, typed by the messages it accepts and emits.
pub trait Channel<I, O>: Send + Sync {
   fn id(&self) -> ChannelId;

   /// Waits for the next inbound message.
   fn receive(&self) -> BoxFuture<'_, Result<I>>;

   fn send(&self, message: O) -> BoxFuture<'_, Result<()>>;
}

/// Shared handle to a channel.
pub type ChannelHandle<I, O> = Arc<dyn Channel<I, O>>;

pub type ControlChannel = ChannelHandle<ControlInbound, ControlOutbound>;
pub type VideoChannel = ChannelHandle<VideoInbound, VideoOutbound>;
pub type AudioChannel = ChannelHandle<AudioInbound, AudioOutbound>;
pub type AvInputChannel = ChannelHandle<AvInputInbound, AvInputOutbound>;
pub type InputChannel = ChannelHandle<InputInbound, InputOutbound>;
pub type BluetoothChannel = ChannelHandle<BluetoothInbound, BluetoothOutbound>;

/// Which audio output stream a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum AudioStream {
   Media,
   Speech,
}

impl AudioStream {
   pub const fn channel_id(self) -> ChannelId {
      match self {
         Self::Media => ChannelId::MediaAudio,
         Self::Speech => ChannelId::SpeechAudio,
      }
   }
}

/// A bound message multiplexer for one transport connection.
///
/// Each accessor binds a fresh typed view onto the given logical channel.
/// Binding has no side effects on the wire.
pub trait Messenger: Send + Sync {
   fn control_channel(&self) -> ControlChannel;
   fn video_channel(&self) -> VideoChannel;
   fn audio_channel(&self, stream: AudioStream) -> AudioChannel;
   fn av_input_channel(&self) -> AvInputChannel;
   fn input_channel(&self) -> InputChannel;
   fn bluetooth_channel(&self) -> BluetoothChannel;
}
