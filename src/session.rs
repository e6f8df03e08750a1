//! A live connection to one phone.
//!
//! A [`ServiceSession`] owns the messenger bound to the transport, the channel
//! services built for it, and the control channel. The control channel
//! answers service discovery, keeps the heartbeat going through a [`Pinger`]
//! and reports the end of the session to its [`SessionObserver`].

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::{
   channel::Messenger,
   completion::Outcome,
   config::{Config, TrafficHandedness},
   driver::DriverFactory,
   error::{AutoAppError, Result},
   pinger::Pinger,
   protocol::{
      ControlInbound, ControlOutbound, PingRequest, PingResponse, ServiceDiscoveryResponse,
      ShutdownReason, timestamp_now,
   },
   service::{
      ServiceFactory, ServiceList,
      runtime::{ChannelHandler, Context, ServiceRuntime},
   },
   transport::Transport,
};

/// Navigation focus type meaning the phone projects its own navigation.
const NAVIGATION_FOCUS_PROJECTED: u32 = 2;

/// The supervisor's view of a session.
pub trait Session: Send {
   /// Starts every channel. `observer` hears about the end of the session.
   fn start(&mut self, observer: Arc<dyn SessionObserver>) -> Result<()>;

   /// Stops every channel. Safe to call repeatedly.
   fn stop(&mut self);
}

pub trait SessionObserver: Send + Sync {
   /// The session ended on its own, by peer request or heartbeat loss.
   fn on_session_ended(&self);
}

pub trait SessionFactory: Send + Sync {
   fn create(&self, transport: Transport) -> Result<Box<dyn Session>>;
}

/// Binds the message multiplexer to a transport.
///
/// The substrate performs the version exchange and link encryption before
/// handing out the messenger.
pub trait MessengerFactory: Send + Sync {
   fn create(&self, transport: Transport) -> Result<Arc<dyn Messenger>>;
}

enum ControlEvent {
   PingCompleted(Outcome<()>),
   ShutdownAcknowledged,
}

struct ControlHandler {
   config: Arc<Config>,
   services: Arc<ServiceList>,
   pinger: Pinger,
   observer: Arc<dyn SessionObserver>,
   ended: bool,
}

impl ControlHandler {
   fn schedule_ping(&self, cx: &mut Context<Self>) {
      let ping = self.pinger.ping();
      cx.spawn(async move { ControlEvent::PingCompleted(ping.await) });
   }

   fn end_session(&mut self) {
      if self.ended {
         return;
      }
      self.ended = true;
      info!("control: session ended");
      self.observer.on_session_ended();
   }

   fn discovery_response(&self) -> ServiceDiscoveryResponse {
      let head_unit = &self.config.head_unit;
      let mut response = ServiceDiscoveryResponse {
         head_unit_name: head_unit.name.clone(),
         car_model: head_unit.car_model.clone(),
         car_year: head_unit.car_year.clone(),
         car_serial: head_unit.car_serial.clone(),
         left_hand_drive: self.config.general.handedness == TrafficHandedness::LeftHandDrive,
         manufacturer: head_unit.manufacturer.clone(),
         model: head_unit.model.clone(),
         sw_build: head_unit.sw_build.clone(),
         sw_version: head_unit.sw_version.clone(),
         can_play_native_media_during_vr: false,
         hide_clock: !self.config.general.show_clock,
         channels: Vec::new(),
      };
      for service in self.services.iter() {
         service.fill_features(&mut response);
      }
      response
   }
}

impl ChannelHandler for ControlHandler {
   type Inbound = ControlInbound;
   type Outbound = ControlOutbound;
   type Event = ControlEvent;

   const NAME: &'static str = "control";

   fn on_start(&mut self, cx: &mut Context<Self>) {
      self.schedule_ping(cx);
   }

   fn handle_message(&mut self, message: ControlInbound, cx: &mut Context<Self>) {
      match message {
         ControlInbound::ServiceDiscoveryRequest { device_name } => {
            info!("control: service discovery request from {device_name}");
            cx.send(ControlOutbound::ServiceDiscoveryResponse(self.discovery_response()));
         },
         ControlInbound::PingRequest(request) => {
            cx.send(ControlOutbound::PingResponse(PingResponse {
               timestamp: request.timestamp,
            }));
         },
         ControlInbound::PingResponse(_) => self.pinger.pong(),
         ControlInbound::AudioFocusRequest(focus) => {
            let state = focus.granted_state();
            info!("control: audio focus request {focus}, granting {state}");
            cx.send(ControlOutbound::AudioFocusResponse(state));
         },
         ControlInbound::NavigationFocusRequest(kind) => {
            info!("control: navigation focus request, type: {kind}");
            cx.send(ControlOutbound::NavigationFocusResponse(NAVIGATION_FOCUS_PROJECTED));
         },
         ControlInbound::ShutdownRequest(reason) => {
            info!("control: shutdown request, reason: {reason}");
            cx.send_then(ControlOutbound::ShutdownResponse, ControlEvent::ShutdownAcknowledged);
         },
         ControlInbound::ShutdownResponse => {
            info!("control: shutdown response");
            self.end_session();
         },
      }
   }

   fn handle_event(&mut self, event: ControlEvent, cx: &mut Context<Self>) {
      match event {
         ControlEvent::PingCompleted(Outcome::Resolved(())) => {
            cx.send(ControlOutbound::PingRequest(PingRequest {
               timestamp: timestamp_now(),
            }));
            self.schedule_ping(cx);
         },
         ControlEvent::PingCompleted(Outcome::Aborted) => debug!("control: ping cycle cancelled"),
         ControlEvent::PingCompleted(Outcome::Failed(AutoAppError::OperationInProgress)) => {},
         ControlEvent::PingCompleted(Outcome::Failed(e)) => {
            error!("control: heartbeat failed: {e}");
            self.end_session();
         },
         ControlEvent::ShutdownAcknowledged => self.end_session(),
      }
   }

   fn handle_channel_error(&mut self, error: AutoAppError, _cx: &mut Context<Self>) {
      error!("control: channel error: {error}");
      self.end_session();
   }

   fn stop(&mut self) {
      self.pinger.cancel();
   }
}

/// Session built from a channel service set and a control channel.
pub struct ServiceSession {
   config: Arc<Config>,
   messenger: Arc<dyn Messenger>,
   services: Arc<ServiceList>,
   control: Option<ServiceRuntime<ControlHandler>>,
   stopped: bool,
}

impl ServiceSession {
   pub fn new(config: Arc<Config>, messenger: Arc<dyn Messenger>, services: ServiceList) -> Self {
      Self {
         config,
         messenger,
         services: Arc::new(services),
         control: None,
         stopped: false,
      }
   }

   /// Asks the phone to end the session. The session ends once it answers.
   pub fn request_shutdown(&self) {
      let Some(control) = &self.control else {
         warn!("session: shutdown requested before start");
         return;
      };
      control.notify(ControlOutbound::ShutdownRequest(ShutdownReason::Quit));
   }
}

impl Session for ServiceSession {
   fn start(&mut self, observer: Arc<dyn SessionObserver>) -> Result<()> {
      if self.stopped || self.control.is_some() {
         return Err(AutoAppError::OperationInProgress);
      }
      info!("session: starting {} services", self.services.len());
      for service in self.services.iter() {
         service.start();
      }

      let handler = ControlHandler {
         config: self.config.clone(),
         services: self.services.clone(),
         pinger: Pinger::new(self.config.ping_interval()),
         observer,
         ended: false,
      };
      let control = ServiceRuntime::new(handler, self.messenger.control_channel());
      control.start();
      self.control = Some(control);
      Ok(())
   }

   fn stop(&mut self) {
      if self.stopped {
         return;
      }
      self.stopped = true;
      info!("session: stopping");
      if let Some(control) = &self.control {
         control.stop();
      }
      for service in self.services.iter() {
         service.stop();
      }
   }
}

/// Builds a [`ServiceSession`] for every new transport.
pub struct ServiceSessionFactory {
   config: Arc<Config>,
   messengers: Arc<dyn MessengerFactory>,
   services: ServiceFactory,
}

impl ServiceSessionFactory {
   pub fn new(
      config: Arc<Config>,
      messengers: Arc<dyn MessengerFactory>,
      drivers: Arc<dyn DriverFactory>,
   ) -> Self {
      Self {
         services: ServiceFactory::new(config.clone(), drivers),
         config,
         messengers,
      }
   }
}

impl SessionFactory for ServiceSessionFactory {
   fn create(&self, transport: Transport) -> Result<Box<dyn Session>> {
      info!("session: binding messenger to {transport}");
      let messenger = self.messengers.create(transport)?;
      let services = self.services.create(&*messenger)?;
      Ok(Box::new(ServiceSession::new(
         self.config.clone(),
         messenger,
         services,
      )))
   }
}
