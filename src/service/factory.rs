//! Builds the service set of a session from a configuration snapshot.

use std::sync::Arc;

use log::{debug, info};

use crate::{
   bluetooth::RemoteBluetoothDevice,
   channel::{AudioStream, Messenger},
   config::{BluetoothAdapterMode, Config},
   driver::{BluetoothDevice, DriverFactory},
   error::{AutoAppError, Result},
   service::{
      AudioInputService, AudioService, BluetoothService, InputService, ServiceList, VideoService,
   },
};

/// Creates the channel services for each new session.
///
/// The returned services are inert until started.
pub struct ServiceFactory {
   config: Arc<Config>,
   drivers: Arc<dyn DriverFactory>,
}

impl ServiceFactory {
   pub fn new(config: Arc<Config>, drivers: Arc<dyn DriverFactory>) -> Self {
      Self { config, drivers }
   }

   pub fn create(&self, messenger: &dyn Messenger) -> Result<ServiceList> {
      let config = &*self.config;
      let mut services: ServiceList = Vec::new();

      services.push(Box::new(AudioInputService::new(
         messenger.av_input_channel(),
         self.drivers.audio_input(config),
      )));

      for stream in self.enabled_audio_streams() {
         services.push(Box::new(AudioService::new(
            stream,
            messenger.audio_channel(stream),
            self.drivers.audio_output(config, stream),
         )));
      }

      services.push(Box::new(VideoService::new(
         messenger.video_channel(),
         self.drivers.video_output(config),
      )));

      if let Some(device) = self.bluetooth_device()? {
         services.push(Box::new(BluetoothService::new(messenger.bluetooth_channel(), device)));
      }

      services.push(Box::new(InputService::new(
         messenger.input_channel(),
         self.drivers.input_device(config),
         config.input.touchscreen_enabled,
      )));

      info!("factory: created {} services", services.len());
      Ok(services)
   }

   fn enabled_audio_streams(&self) -> impl Iterator<Item = AudioStream> + '_ {
      [
         (AudioStream::Media, self.config.audio.music_channel_enabled),
         (AudioStream::Speech, self.config.audio.speech_channel_enabled),
      ]
      .into_iter()
      .filter_map(|(stream, enabled)| enabled.then_some(stream))
   }

   fn bluetooth_device(&self) -> Result<Option<Arc<dyn BluetoothDevice>>> {
      match self.config.bluetooth.adapter {
         BluetoothAdapterMode::Disabled => {
            debug!("factory: bluetooth disabled");
            Ok(None)
         },
         BluetoothAdapterMode::Local => self.drivers.local_bluetooth().map(Some).ok_or_else(|| {
            AutoAppError::InvalidConfig("local bluetooth adapter requested but none is up".into())
         }),
         BluetoothAdapterMode::Remote => {
            let device = RemoteBluetoothDevice::new(&self.config.bluetooth.remote_address)?;
            Ok(Some(Arc::new(device)))
         },
      }
   }
}
