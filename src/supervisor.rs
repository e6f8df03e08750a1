//! Connection supervisor.
//!
//! Finds a phone, builds a session for it and waits for that session to end
//! before looking again. Discovery runs two branches side by side: a wait on
//! the USB hub for an accessory to arrive and a one-off enumeration that
//! switches phones already plugged in. Wireless connections come in through
//! [`Supervisor::accept_incoming_connection`].
//!
//! At most one session exists at a time. Every entry point is serialized on
//! the supervisor actor, so a connection arriving while a session is being
//! built is simply refused.

use std::{fmt, sync::Arc, time::Duration};

use log::{debug, error, info, warn};
use tokio::{
   select,
   sync::{mpsc, oneshot},
   task::JoinSet,
   time,
};

use crate::{
   completion::Outcome,
   error::{AutoAppError, Result},
   session::{Session, SessionFactory, SessionObserver},
   transport::{AccessoryDevice, AccessoryEnumerator, Transport, UsbHub},
};

/// Delay before waiting on the hub again after it failed.
const HUB_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SupervisorState {
   Idle,
   Discovering,
   SessionActive,
   Stopped,
}

// === Commands ===

enum SupervisorCommand {
   BeginDiscovery,
   IncomingConnection(Transport),
   Stop,
   GetState(oneshot::Sender<SupervisorState>),
}

enum SupervisorEvent {
   DeviceArrived(u64, Outcome<Box<dyn AccessoryDevice>>),
   EnumerationFinished(Outcome<usize>),
   SessionEnded(u64),
   RetryWait,
}

impl fmt::Debug for SupervisorEvent {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Self::DeviceArrived(wait, _) => write!(f, "DeviceArrived({wait})"),
         Self::EnumerationFinished(_) => f.write_str("EnumerationFinished"),
         Self::SessionEnded(generation) => write!(f, "SessionEnded({generation})"),
         Self::RetryWait => f.write_str("RetryWait"),
      }
   }
}

// === Handle ===

/// Handle to the supervisor actor. Cheap to clone.
#[derive(Clone)]
pub struct Supervisor {
   inbox: mpsc::UnboundedSender<SupervisorCommand>,
}

impl Supervisor {
   pub fn new(
      hub: Arc<dyn UsbHub>,
      enumerator: Arc<dyn AccessoryEnumerator>,
      sessions: Arc<dyn SessionFactory>,
   ) -> Self {
      let (inbox, commands) = mpsc::unbounded_channel();
      let (loopback_tx, loopback_rx) = mpsc::unbounded_channel();
      let actor = SupervisorActor {
         hub,
         enumerator,
         sessions,
         loopback: loopback_tx,
         session: None,
         generation: 0,
         wait_id: 0,
         waiting: false,
         stopped: false,
         tasks: JoinSet::new(),
      };
      tokio::spawn(actor.run(commands, loopback_rx));
      Self { inbox }
   }

   /// Starts looking for a phone. Also clears a previous [`Supervisor::stop`].
   pub fn begin_discovery(&self) {
      let _ = self.inbox.send(SupervisorCommand::BeginDiscovery);
   }

   /// Hands over a connection accepted on a listening socket.
   ///
   /// The transport is closed right away if a session is already active.
   pub fn accept_incoming_connection(&self, transport: Transport) -> Result<()> {
      self
         .inbox
         .send(SupervisorCommand::IncomingConnection(transport))
         .map_err(|_| AutoAppError::SupervisorShutdown)
   }

   /// Cancels discovery and stops the active session, if any.
   pub fn stop(&self) {
      let _ = self.inbox.send(SupervisorCommand::Stop);
   }

   pub async fn state(&self) -> Result<SupervisorState> {
      let (tx, rx) = oneshot::channel();
      self
         .inbox
         .send(SupervisorCommand::GetState(tx))
         .map_err(|_| AutoAppError::SupervisorShutdown)?;
      rx.await.map_err(|_| AutoAppError::SupervisorShutdown)
   }
}

/// Forwards a session's end to the supervisor, tagged with the session it
/// belongs to.
struct SessionEndNotifier {
   loopback: mpsc::UnboundedSender<SupervisorEvent>,
   generation: u64,
}

impl SessionObserver for SessionEndNotifier {
   fn on_session_ended(&self) {
      let _ = self
         .loopback
         .send(SupervisorEvent::SessionEnded(self.generation));
   }
}

// === Actor ===

struct SupervisorActor {
   hub: Arc<dyn UsbHub>,
   enumerator: Arc<dyn AccessoryEnumerator>,
   sessions: Arc<dyn SessionFactory>,
   loopback: mpsc::UnboundedSender<SupervisorEvent>,

   session: Option<Box<dyn Session>>,
   /// Bumped for every session so late notifications from an old one are ignored.
   generation: u64,
   /// Identifies the current hub wait. Results of cancelled waits carry an
   /// older id.
   wait_id: u64,
   waiting: bool,
   stopped: bool,
   tasks: JoinSet<()>,
}

impl SupervisorActor {
   async fn run(
      mut self,
      mut commands: mpsc::UnboundedReceiver<SupervisorCommand>,
      mut loopback: mpsc::UnboundedReceiver<SupervisorEvent>,
   ) {
      info!("supervisor: starting up");
      loop {
         select! {
            biased;
            Some(event) = loopback.recv() => self.handle_event(event),
            cmd = commands.recv() => {
               let Some(cmd) = cmd else {
                  break;
               };
               self.handle_command(cmd);
            }
         }
         while self.tasks.try_join_next().is_some() {}
      }

      info!("supervisor: shutting down");
      self.shutdown();
   }

   fn state(&self) -> SupervisorState {
      if self.stopped {
         SupervisorState::Stopped
      } else if self.session.is_some() {
         SupervisorState::SessionActive
      } else if self.waiting {
         SupervisorState::Discovering
      } else {
         SupervisorState::Idle
      }
   }

   fn handle_command(&mut self, cmd: SupervisorCommand) {
      match cmd {
         SupervisorCommand::BeginDiscovery => {
            self.stopped = false;
            if self.session.is_some() {
               warn!("supervisor: discovery requested while a session is active");
               return;
            }
            self.wait_for_device();
            self.enumerate_devices();
         },
         SupervisorCommand::IncomingConnection(transport) => {
            if self.stopped || self.session.is_some() {
               warn!("supervisor: refusing {transport}, state: {}", self.state());
               transport.close();
               return;
            }
            info!("supervisor: incoming connection {transport}");
            self.cancel_discovery();
            self.start_session(transport);
         },
         SupervisorCommand::Stop => {
            info!("supervisor: stop");
            self.stopped = true;
            self.shutdown();
         },
         SupervisorCommand::GetState(reply) => {
            let _ = reply.send(self.state());
         },
      }
   }

   fn handle_event(&mut self, event: SupervisorEvent) {
      debug!("supervisor: {event:?}");
      match event {
         SupervisorEvent::DeviceArrived(wait, outcome) => {
            let current = wait == self.wait_id;
            if current {
               self.waiting = false;
            }
            match outcome {
               Outcome::Resolved(device) => self.device_arrived(device),
               Outcome::Aborted => debug!("supervisor: device wait cancelled"),
               Outcome::Failed(AutoAppError::OperationInProgress) => {
                  debug!("supervisor: device wait already in progress");
               },
               Outcome::Failed(e) => {
                  error!("supervisor: usb hub error: {e}");
                  if current {
                     self.schedule_retry();
                  }
               },
            }
         },
         SupervisorEvent::EnumerationFinished(outcome) => match outcome {
            Outcome::Resolved(count) => info!("supervisor: switched {count} connected devices"),
            Outcome::Aborted => debug!("supervisor: enumeration cancelled"),
            Outcome::Failed(e) => warn!("supervisor: enumeration failed: {e}"),
         },
         SupervisorEvent::SessionEnded(generation) => self.session_ended(generation),
         SupervisorEvent::RetryWait => {
            if !self.stopped && self.session.is_none() && !self.waiting {
               self.wait_for_device();
            }
         },
      }
   }

   fn device_arrived(&mut self, device: Box<dyn AccessoryDevice>) {
      let transport = Transport::Usb(device);
      if self.stopped || self.session.is_some() {
         warn!("supervisor: ignoring {transport}, state: {}", self.state());
         transport.close();
         return;
      }
      info!("supervisor: device arrived {transport}");
      self.enumerator.cancel();
      self.start_session(transport);
   }

   fn session_ended(&mut self, generation: u64) {
      if generation != self.generation || self.session.is_none() {
         debug!("supervisor: stale session end notification ({generation})");
         return;
      }
      info!("supervisor: session ended");
      if let Some(mut session) = self.session.take() {
         session.stop();
      }
      if !self.stopped {
         self.wait_for_device();
      }
   }

   fn start_session(&mut self, transport: Transport) {
      let mut session = match self.sessions.create(transport) {
         Ok(session) => session,
         Err(e) => {
            error!("supervisor: session construction failed: {e}");
            self.wait_for_device();
            return;
         },
      };

      self.generation += 1;
      let observer = Arc::new(SessionEndNotifier {
         loopback: self.loopback.clone(),
         generation: self.generation,
      });
      match session.start(observer) {
         Ok(()) => {
            info!("supervisor: session {} started", self.generation);
            self.session = Some(session);
         },
         Err(e) => {
            error!("supervisor: session start failed: {e}");
            session.stop();
            self.wait_for_device();
         },
      }
   }

   fn wait_for_device(&mut self) {
      if self.waiting {
         return;
      }
      info!("supervisor: waiting for device");
      self.waiting = true;
      self.wait_id += 1;
      let id = self.wait_id;
      let wait = self.hub.wait_for_device();
      let loopback = self.loopback.clone();
      self.tasks.spawn(async move {
         let _ = loopback.send(SupervisorEvent::DeviceArrived(id, wait.await));
      });
   }

   fn enumerate_devices(&mut self) {
      let enumeration = self.enumerator.enumerate();
      let loopback = self.loopback.clone();
      self.tasks.spawn(async move {
         let _ = loopback.send(SupervisorEvent::EnumerationFinished(enumeration.await));
      });
   }

   fn schedule_retry(&mut self) {
      if self.stopped {
         return;
      }
      let loopback = self.loopback.clone();
      self.tasks.spawn(async move {
         time::sleep(HUB_RETRY_DELAY).await;
         let _ = loopback.send(SupervisorEvent::RetryWait);
      });
   }

   fn cancel_discovery(&mut self) {
      self.hub.cancel();
      self.enumerator.cancel();
      self.waiting = false;
   }

   fn shutdown(&mut self) {
      self.cancel_discovery();
      if let Some(mut session) = self.session.take() {
         session.stop();
      }
   }
}
