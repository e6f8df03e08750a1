//! Microphone capture service.
//!
//! The phone toggles capture with input-open requests. While capture is
//! active exactly one driver read is outstanding; the next read is issued
//! only once the previous chunk was written out to the channel. Reopening a
//! capture that is already reading keeps the running read loop.

use std::sync::Arc;

use log::{debug, error, info};

use crate::{
   channel::AvInputChannel,
   driver::AudioInput,
   error::Result,
   protocol::{
      AudioConfigEntry, AvChannelSetupResponse, AvInputInbound, AvInputOpenResponse,
      AvInputOutbound, AvStreamType, ChannelDescriptorKind, ChannelId, ChannelOpenResponse,
      ServiceDiscoveryResponse, SessionId, Status, timestamp_now,
   },
   service::{
      Service,
      runtime::{ChannelHandler, Context, ServiceRuntime},
   },
};

/// Capture is a single logical stream.
const SESSION: SessionId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureState {
   AwaitingOpen,
   AwaitingSetup,
   Idle,
   Active,
}

enum CaptureEvent {
   Started(Result<()>),
   /// Tagged with the read loop that issued it.
   Read(u64, Result<Vec<u8>>),
   MediaSent(u64),
}

struct AudioInputHandler {
   input: Arc<dyn AudioInput>,
   state: CaptureState,
   /// A read loop is running.
   reading: bool,
   /// Bumped on close; events of an older loop are dropped.
   read_loop: u64,
}

impl AudioInputHandler {
   fn transition(&mut self, next: CaptureState) {
      if self.state != next {
         debug!("audio_input: {:?} -> {next:?}", self.state);
         self.state = next;
      }
   }

   fn respond(cx: &mut Context<Self>, value: u32) {
      cx.send(AvInputOutbound::InputOpenResponse(AvInputOpenResponse {
         session: SESSION,
         value,
      }));
   }

   fn read(&mut self, cx: &mut Context<Self>) {
      if !self.input.is_active() {
         debug!("audio_input: capture inactive, read loop ends");
         self.reading = false;
         return;
      }
      self.reading = true;
      let read_loop = self.read_loop;
      let read = self.input.read();
      cx.spawn(async move { CaptureEvent::Read(read_loop, read.await) });
   }

   fn is_current(&self, read_loop: u64) -> bool {
      if read_loop != self.read_loop {
         debug!("audio_input: dropping result of closed read loop {read_loop}");
         return false;
      }
      true
   }
}

impl ChannelHandler for AudioInputHandler {
   type Inbound = AvInputInbound;
   type Outbound = AvInputOutbound;
   type Event = CaptureEvent;

   const NAME: &'static str = "audio_input";

   fn handle_message(&mut self, message: AvInputInbound, cx: &mut Context<Self>) {
      match message {
         AvInputInbound::OpenRequest(request) => {
            info!("audio_input: open request, priority: {}", request.priority);
            let status = Status::from_success(self.input.open());
            info!("audio_input: open status: {status}");
            cx.send(AvInputOutbound::OpenResponse(ChannelOpenResponse { status }));
            self.transition(CaptureState::AwaitingSetup);
         },
         AvInputInbound::SetupRequest(request) => {
            info!("audio_input: setup request, config index: {}", request.config_index);
            cx.send(AvInputOutbound::SetupResponse(
               AvChannelSetupResponse::single_config(Status::Ok),
            ));
            self.transition(CaptureState::Idle);
         },
         AvInputInbound::InputOpenRequest(request) => {
            info!(
               "audio_input: input open request, open: {}, anc: {}, ec: {}, max unacked: {}",
               request.open, request.anc, request.ec, request.max_unacked
            );
            if request.open {
               let start = self.input.start();
               cx.spawn(async move { CaptureEvent::Started(start.await) });
            } else {
               self.input.stop();
               self.read_loop += 1;
               self.reading = false;
               Self::respond(cx, 0);
               self.transition(CaptureState::Idle);
            }
         },
         AvInputInbound::MediaAck(_) => {},
      }
   }

   fn handle_event(&mut self, event: CaptureEvent, cx: &mut Context<Self>) {
      match event {
         CaptureEvent::Started(Ok(())) => {
            info!("audio_input: capture started");
            Self::respond(cx, 0);
            self.transition(CaptureState::Active);
            if self.reading {
               debug!("audio_input: already reading");
            } else {
               self.read(cx);
            }
         },
         CaptureEvent::Started(Err(e)) => {
            error!("audio_input: capture start failed: {e}");
            Self::respond(cx, 1);
         },
         CaptureEvent::Read(read_loop, _) if !self.is_current(read_loop) => {},
         CaptureEvent::Read(read_loop, Ok(data)) => {
            cx.send_then(
               AvInputOutbound::Media {
                  timestamp: timestamp_now(),
                  data,
               },
               CaptureEvent::MediaSent(read_loop),
            );
         },
         CaptureEvent::Read(_, Err(e)) => {
            debug!("audio_input: read rejected: {e}");
            self.reading = false;
            self.transition(CaptureState::Idle);
         },
         CaptureEvent::MediaSent(read_loop) => {
            if self.is_current(read_loop) {
               self.read(cx);
            }
         },
      }
   }

   fn stop(&mut self) {
      self.input.stop();
   }
}

/// Streams microphone audio to the phone on request.
pub struct AudioInputService {
   channel_id: ChannelId,
   input: Arc<dyn AudioInput>,
   runtime: ServiceRuntime<AudioInputHandler>,
}

impl AudioInputService {
   pub fn new(channel: AvInputChannel, input: Arc<dyn AudioInput>) -> Self {
      let handler = AudioInputHandler {
         input: input.clone(),
         state: CaptureState::AwaitingOpen,
         reading: false,
         read_loop: 0,
      };
      Self {
         channel_id: channel.id(),
         input,
         runtime: ServiceRuntime::new(handler, channel),
      }
   }
}

impl Service for AudioInputService {
   fn start(&self) {
      self.runtime.start();
   }

   fn stop(&self) {
      self.runtime.stop();
   }

   fn fill_features(&self, response: &mut ServiceDiscoveryResponse) {
      info!("audio_input: fill features");
      response.add_channel(self.channel_id, ChannelDescriptorKind::AvInput {
         stream_type: AvStreamType::Audio,
         audio_config: AudioConfigEntry {
            sample_rate: self.input.sample_rate(),
            bit_depth: self.input.sample_size(),
            channel_count: self.input.channel_count(),
         },
      });
   }
}

#[cfg(test)]
mod tests {
   use std::{sync::atomic::Ordering, time::Duration};

   use super::*;
   use crate::{
      protocol::{AvChannelSetupRequest, AvInputOpenRequest, AvMediaAckIndication, ChannelOpenRequest},
      testing::{MockAudioInput, eventually, gated_channel, init_logger, mock_channel},
   };

   fn input_open(open: bool) -> AvInputInbound {
      AvInputInbound::InputOpenRequest(AvInputOpenRequest {
         open,
         anc: false,
         ec: false,
         max_unacked: 1,
      })
   }

   fn open_response(value: u32) -> AvInputOutbound {
      AvInputOutbound::InputOpenResponse(AvInputOpenResponse { session: 0, value })
   }

   #[tokio::test]
   async fn test_open_and_setup_always_ok() {
      init_logger();
      let (channel, mut peer) = mock_channel::<AvInputInbound, AvInputOutbound>(ChannelId::AvInput);
      let service = AudioInputService::new(channel, Arc::new(MockAudioInput::default()));
      service.start();

      peer.push(AvInputInbound::OpenRequest(ChannelOpenRequest {
         priority: 0,
         channel_id: ChannelId::AvInput as u32,
      }));
      assert_eq!(
         peer.next().await,
         AvInputOutbound::OpenResponse(ChannelOpenResponse { status: Status::Ok })
      );

      peer.push(AvInputInbound::SetupRequest(AvChannelSetupRequest { config_index: 7 }));
      assert_eq!(
         peer.next().await,
         AvInputOutbound::SetupResponse(AvChannelSetupResponse {
            media_status: Status::Ok,
            max_unacked: 1,
            configs: vec![0],
         })
      );
   }

   #[tokio::test]
   async fn test_next_read_waits_for_media_send() {
      init_logger();
      let (channel, mut peer, gate) =
         gated_channel::<AvInputInbound, AvInputOutbound>(ChannelId::AvInput);
      let input = Arc::new(MockAudioInput::default());
      let service = AudioInputService::new(channel, input.clone());
      service.start();

      peer.push(input_open(true));
      assert_eq!(peer.next().await, open_response(0));
      gate.add_permits(1);
      eventually(|| input.reads() == 1).await;

      input.feed(b"pcm-1");
      let AvInputOutbound::Media { timestamp, data } = peer.next().await else {
         panic!("expected media indication");
      };
      assert!(timestamp > 0);
      assert_eq!(data, b"pcm-1");

      // The media send is still blocked, so no second read may be issued.
      tokio::time::sleep(Duration::from_millis(30)).await;
      assert_eq!(input.reads(), 1);

      gate.add_permits(1);
      eventually(|| input.reads() == 2).await;
   }

   #[tokio::test]
   async fn test_reopen_keeps_single_read() {
      init_logger();
      let (channel, mut peer) = mock_channel::<AvInputInbound, AvInputOutbound>(ChannelId::AvInput);
      let input = Arc::new(MockAudioInput::default());
      let service = AudioInputService::new(channel, input.clone());
      service.start();

      peer.push(input_open(true));
      assert_eq!(peer.next().await, open_response(0));
      peer.push(input_open(true));
      assert_eq!(peer.next().await, open_response(0));

      tokio::time::sleep(Duration::from_millis(50)).await;
      assert_eq!(input.starts.load(Ordering::SeqCst), 2);
      assert_eq!(input.reads(), 1);

      input.feed(b"pcm");
      assert!(matches!(peer.next().await, AvInputOutbound::Media { .. }));
      eventually(|| input.reads() == 2).await;
      tokio::time::sleep(Duration::from_millis(30)).await;
      assert_eq!(input.reads(), 2);
   }

   #[tokio::test]
   async fn test_start_failure_reports_value_one() {
      init_logger();
      let (channel, mut peer) = mock_channel::<AvInputInbound, AvInputOutbound>(ChannelId::AvInput);
      let input = Arc::new(MockAudioInput::default());
      input.start_ok.store(false, Ordering::SeqCst);
      let service = AudioInputService::new(channel, input.clone());
      service.start();

      peer.push(input_open(true));
      assert_eq!(peer.next().await, open_response(1));
      peer.assert_silent().await;
      assert_eq!(input.reads(), 0);
   }

   #[tokio::test]
   async fn test_close_stops_driver_then_responds() {
      init_logger();
      let (channel, mut peer) = mock_channel::<AvInputInbound, AvInputOutbound>(ChannelId::AvInput);
      let input = Arc::new(MockAudioInput::default());
      let service = AudioInputService::new(channel, input.clone());
      service.start();

      peer.push(input_open(false));
      assert_eq!(peer.next().await, open_response(0));
      assert_eq!(input.stops.load(Ordering::SeqCst), 1);
      assert_eq!(input.starts.load(Ordering::SeqCst), 0);
   }

   #[tokio::test]
   async fn test_read_rejection_ends_loop_until_reopened() {
      init_logger();
      let (channel, mut peer) = mock_channel::<AvInputInbound, AvInputOutbound>(ChannelId::AvInput);
      let input = Arc::new(MockAudioInput::default());
      let service = AudioInputService::new(channel, input.clone());
      service.start();

      peer.push(input_open(true));
      assert_eq!(peer.next().await, open_response(0));
      eventually(|| input.reads() == 1).await;

      input.fail_read();
      peer.assert_silent().await;
      assert_eq!(input.reads(), 1);

      peer.push(input_open(true));
      assert_eq!(peer.next().await, open_response(0));
      eventually(|| input.reads() == 2).await;
   }

   #[tokio::test]
   async fn test_media_ack_is_discarded() {
      init_logger();
      let (channel, mut peer) = mock_channel::<AvInputInbound, AvInputOutbound>(ChannelId::AvInput);
      let input = Arc::new(MockAudioInput::default());
      let service = AudioInputService::new(channel, input.clone());
      service.start();

      peer.push(AvInputInbound::MediaAck(AvMediaAckIndication {
         session: 0,
         value: 1,
      }));
      peer.assert_silent().await;
      assert_eq!(input.reads(), 0);
   }

   #[test]
   fn test_fill_features_reports_capture_format() {
      let (channel, _peer) = mock_channel::<AvInputInbound, AvInputOutbound>(ChannelId::AvInput);
      let service = AudioInputService::new(channel, Arc::new(MockAudioInput::default()));

      let mut response = ServiceDiscoveryResponse::default();
      service.fill_features(&mut response);

      assert_eq!(
         response.channel(ChannelId::AvInput).map(|d| &d.kind),
         Some(&ChannelDescriptorKind::AvInput {
            stream_type: AvStreamType::Audio,
            audio_config: AudioConfigEntry {
               sample_rate: 16000,
               bit_depth: 16,
               channel_count: 1,
            },
         })
      );
   }
}
