//! Touchscreen and hardware button service.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::{
   channel::InputChannel,
   driver::InputDevice,
   protocol::{
      BindingResponse, ChannelDescriptorKind, ChannelId, ChannelOpenResponse, InputEvent,
      InputEventIndication, InputInbound, InputOutbound, ServiceDiscoveryResponse, Status,
      timestamp_now,
   },
   service::{
      Service,
      runtime::{ChannelHandler, Context, ServiceRuntime},
   },
};

enum InputServiceEvent {
   /// An event from the device together with the stream it came from, so the
   /// next one can be awaited.
   Device(InputEvent, mpsc::UnboundedReceiver<InputEvent>),
   DeviceClosed,
}

struct InputHandler {
   device: Arc<dyn InputDevice>,
}

impl InputHandler {
   fn listen(cx: &mut Context<Self>, mut events: mpsc::UnboundedReceiver<InputEvent>) {
      cx.spawn(async move {
         match events.recv().await {
            Some(event) => InputServiceEvent::Device(event, events),
            None => InputServiceEvent::DeviceClosed,
         }
      });
   }

   fn supports_all(&self, scan_codes: &[u32]) -> bool {
      let supported = self.device.supported_buttons();
      scan_codes
         .iter()
         .all(|code| supported.iter().any(|button| *button as u32 == *code))
   }
}

impl ChannelHandler for InputHandler {
   type Inbound = InputInbound;
   type Outbound = InputOutbound;
   type Event = InputServiceEvent;

   const NAME: &'static str = "input";

   fn handle_message(&mut self, message: InputInbound, cx: &mut Context<Self>) {
      match message {
         InputInbound::OpenRequest(request) => {
            info!("input: open request, priority: {}", request.priority);
            cx.send(InputOutbound::OpenResponse(ChannelOpenResponse { status: Status::Ok }));
         },
         InputInbound::BindingRequest(request) => {
            info!("input: binding request, scan codes: {}", request.scan_codes.len());
            let status = Status::from_success(self.supports_all(&request.scan_codes));
            if status == Status::Ok {
               let (tx, rx) = mpsc::unbounded_channel();
               self.device.start(tx);
               Self::listen(cx, rx);
            } else {
               warn!("input: binding refused, unsupported scan code requested");
            }
            info!("input: binding status: {status}");
            cx.send(InputOutbound::BindingResponse(BindingResponse { status }));
         },
      }
   }

   fn handle_event(&mut self, event: InputServiceEvent, cx: &mut Context<Self>) {
      match event {
         InputServiceEvent::Device(event, events) => {
            debug!("input: device event {event:?}");
            cx.send(InputOutbound::Event(InputEventIndication {
               timestamp: timestamp_now(),
               event,
            }));
            Self::listen(cx, events);
         },
         InputServiceEvent::DeviceClosed => debug!("input: device event stream closed"),
      }
   }

   fn stop(&mut self) {
      self.device.stop();
   }
}

/// Forwards touch and key events from an [`InputDevice`] to the phone.
pub struct InputService {
   channel_id: ChannelId,
   device: Arc<dyn InputDevice>,
   touchscreen_enabled: bool,
   runtime: ServiceRuntime<InputHandler>,
}

impl InputService {
   /// With `touchscreen_enabled` off no touch surface is advertised, even if
   /// the device has one.
   pub fn new(
      channel: InputChannel,
      device: Arc<dyn InputDevice>,
      touchscreen_enabled: bool,
   ) -> Self {
      let handler = InputHandler {
         device: device.clone(),
      };
      Self {
         channel_id: channel.id(),
         device,
         touchscreen_enabled,
         runtime: ServiceRuntime::new(handler, channel),
      }
   }
}

impl Service for InputService {
   fn start(&self) {
      self.runtime.start();
   }

   fn stop(&self) {
      self.runtime.stop();
   }

   fn fill_features(&self, response: &mut ServiceDiscoveryResponse) {
      info!("input: fill features");
      let supported_keycodes = self
         .device
         .supported_buttons()
         .into_iter()
         .map(|button| button as u32)
         .collect();
      let touch_screen = (self.touchscreen_enabled && self.device.has_touchscreen())
         .then(|| self.device.touchscreen_geometry());
      response.add_channel(self.channel_id, ChannelDescriptorKind::Input {
         supported_keycodes,
         touch_screen,
      });
   }
}
