//! Video projection service.

use std::sync::Arc;

use log::{debug, info};

use crate::{
   channel::VideoChannel,
   driver::VideoOutput,
   protocol::{
      AvChannelSetupResponse, AvMediaAckIndication, AvStreamType, ChannelDescriptorKind,
      ChannelId, ChannelOpenResponse, ServiceDiscoveryResponse, SessionId, Status,
      VideoConfigEntry, VideoFocusIndication, VideoInbound, VideoOutbound,
   },
   service::{
      Service,
      runtime::{ChannelHandler, Context, ServiceRuntime},
   },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VideoState {
   AwaitingOpen,
   AwaitingSetup,
   Configured,
   Streaming,
}

enum VideoEvent {
   SetupResponseSent,
}

struct VideoHandler {
   output: Arc<dyn VideoOutput>,
   session: SessionId,
   state: VideoState,
}

impl VideoHandler {
   fn transition(&mut self, next: VideoState) {
      if self.state != next {
         debug!("video: {:?} -> {next:?}", self.state);
         self.state = next;
      }
   }

   /// Focus is always granted, whatever the phone asked for.
   fn send_focus_indication(cx: &mut Context<Self>) {
      info!("video: focus indication");
      cx.send(VideoOutbound::FocusIndication(VideoFocusIndication::GRANTED));
   }
}

impl ChannelHandler for VideoHandler {
   type Inbound = VideoInbound;
   type Outbound = VideoOutbound;
   type Event = VideoEvent;

   const NAME: &'static str = "video";

   fn handle_message(&mut self, message: VideoInbound, cx: &mut Context<Self>) {
      match message {
         VideoInbound::OpenRequest(request) => {
            info!("video: open request, priority: {}", request.priority);
            let status = Status::from_success(self.output.open());
            info!("video: open status: {status}");
            cx.send(VideoOutbound::OpenResponse(ChannelOpenResponse { status }));
            self.transition(VideoState::AwaitingSetup);
         },
         VideoInbound::SetupRequest(request) => {
            info!("video: setup request, config index: {}", request.config_index);
            let status = Status::from_success(self.output.init());
            info!("video: setup status: {status}");
            cx.send_then(
               VideoOutbound::SetupResponse(AvChannelSetupResponse::single_config(status)),
               VideoEvent::SetupResponseSent,
            );
            self.transition(VideoState::Configured);
         },
         VideoInbound::StartIndication(indication) => {
            info!("video: start indication, session: {}", indication.session);
            self.session = indication.session;
            self.transition(VideoState::Streaming);
         },
         VideoInbound::StopIndication(_) => {
            info!("video: stop indication");
            self.transition(VideoState::Configured);
         },
         VideoInbound::Media(media) => {
            self.output.write(media.timestamp.unwrap_or(0), &media.data);
            cx.send(VideoOutbound::MediaAck(AvMediaAckIndication {
               session: self.session,
               value: 1,
            }));
         },
         VideoInbound::FocusRequest(request) => {
            info!(
               "video: focus request, display index: {}, focus mode: {}, focus reason: {}",
               request.display_index, request.focus_mode, request.focus_reason
            );
            Self::send_focus_indication(cx);
         },
      }
   }

   fn handle_event(&mut self, event: VideoEvent, cx: &mut Context<Self>) {
      match event {
         VideoEvent::SetupResponseSent => Self::send_focus_indication(cx),
      }
   }

   fn stop(&mut self) {
      self.output.stop();
   }
}

/// Streams projected video frames into a [`VideoOutput`], acknowledging each.
pub struct VideoService {
   channel_id: ChannelId,
   output: Arc<dyn VideoOutput>,
   runtime: ServiceRuntime<VideoHandler>,
}

impl VideoService {
   pub fn new(channel: VideoChannel, output: Arc<dyn VideoOutput>) -> Self {
      let handler = VideoHandler {
         output: output.clone(),
         session: -1,
         state: VideoState::AwaitingOpen,
      };
      Self {
         channel_id: channel.id(),
         output,
         runtime: ServiceRuntime::new(handler, channel),
      }
   }
}

impl Service for VideoService {
   fn start(&self) {
      self.runtime.start();
   }

   fn stop(&self) {
      self.runtime.stop();
   }

   fn fill_features(&self, response: &mut ServiceDiscoveryResponse) {
      info!("video: fill features");
      let (margin_width, margin_height) = self.output.margins();
      response.add_channel(self.channel_id, ChannelDescriptorKind::AvOutput {
         stream_type: AvStreamType::Video,
         audio_type: None,
         available_while_in_call: true,
         video_configs: vec![VideoConfigEntry {
            resolution: self.output.resolution(),
            fps: self.output.fps(),
            margin_width,
            margin_height,
            dpi: self.output.screen_dpi(),
         }],
         audio_configs: Vec::new(),
      });
   }
}
