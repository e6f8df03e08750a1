//! Audio output services (media and speech streams).

use std::sync::Arc;

use log::info;

use crate::{
   channel::{AudioChannel, AudioStream},
   driver::AudioOutput,
   protocol::{
      AudioConfigEntry, AudioInbound, AudioOutbound, AudioType, AvChannelSetupResponse,
      AvMediaAckIndication, AvStreamType, ChannelDescriptorKind, ChannelId, ChannelOpenResponse,
      ServiceDiscoveryResponse, SessionId, Status,
   },
   service::{
      Service,
      runtime::{ChannelHandler, Context, ServiceRuntime},
   },
};

struct AudioHandler {
   stream: AudioStream,
   output: Arc<dyn AudioOutput>,
   session: SessionId,
}

impl ChannelHandler for AudioHandler {
   type Inbound = AudioInbound;
   type Outbound = AudioOutbound;
   type Event = ();

   const NAME: &'static str = "audio";

   fn handle_message(&mut self, message: AudioInbound, cx: &mut Context<Self>) {
      let stream = self.stream;
      match message {
         AudioInbound::OpenRequest(request) => {
            info!("audio/{stream}: open request, priority: {}", request.priority);
            let status = Status::from_success(self.output.open());
            info!("audio/{stream}: open status: {status}");
            cx.send(AudioOutbound::OpenResponse(ChannelOpenResponse { status }));
         },
         AudioInbound::SetupRequest(request) => {
            info!("audio/{stream}: setup request, config index: {}", request.config_index);
            let status = Status::from_success(self.output.init());
            info!("audio/{stream}: setup status: {status}");
            cx.send(AudioOutbound::SetupResponse(
               AvChannelSetupResponse::single_config(status),
            ));
         },
         AudioInbound::StartIndication(indication) => {
            info!("audio/{stream}: start indication, session: {}", indication.session);
            self.session = indication.session;
            self.output.start();
         },
         AudioInbound::StopIndication(_) => {
            info!("audio/{stream}: stop indication");
            self.session = -1;
            self.output.suspend();
         },
         AudioInbound::Media(media) => {
            self.output.write(media.timestamp.unwrap_or(0), &media.data);
            cx.send(AudioOutbound::MediaAck(AvMediaAckIndication {
               session: self.session,
               value: 1,
            }));
         },
      }
   }

   fn stop(&mut self) {
      self.output.stop();
   }
}

/// Plays one audio output stream and acknowledges each chunk.
pub struct AudioService {
   stream: AudioStream,
   channel_id: ChannelId,
   output: Arc<dyn AudioOutput>,
   runtime: ServiceRuntime<AudioHandler>,
}

impl AudioService {
   pub fn new(stream: AudioStream, channel: AudioChannel, output: Arc<dyn AudioOutput>) -> Self {
      let handler = AudioHandler {
         stream,
         output: output.clone(),
         session: -1,
      };
      Self {
         stream,
         channel_id: channel.id(),
         output,
         runtime: ServiceRuntime::new(handler, channel),
      }
   }
}

impl Service for AudioService {
   fn start(&self) {
      self.runtime.start();
   }

   fn stop(&self) {
      self.runtime.stop();
   }

   fn fill_features(&self, response: &mut ServiceDiscoveryResponse) {
      info!("audio/{}: fill features", self.stream);
      let audio_type = match self.stream {
         AudioStream::Media => AudioType::Media,
         AudioStream::Speech => AudioType::Speech,
      };
      response.add_channel(self.channel_id, ChannelDescriptorKind::AvOutput {
         stream_type: AvStreamType::Audio,
         audio_type: Some(audio_type),
         available_while_in_call: true,
         video_configs: Vec::new(),
         audio_configs: vec![AudioConfigEntry {
            sample_rate: self.output.sample_rate(),
            bit_depth: self.output.sample_size(),
            channel_count: self.output.channel_count(),
         }],
      });
   }
}
