//! Actor runtime shared by every channel service.
//!
//! A running service is three tasks plus the actor itself:
//! - the reader re-issues `receive()` as soon as a message is handed over,
//!   so inbound traffic never waits on an outbound send. The hand-over queue
//!   holds a single message, so a slow handler stalls the reader instead of
//!   letting it buffer the transport;
//! - the writer performs sends one at a time in submission order and posts
//!   the optional continuation back to the actor once a send completes;
//! - driver futures run as detached tasks whose result comes back as an event.
//!
//! All handler code runs on the actor task, one message or event at a time.
//! Channel errors from either loop are reported to the handler there too.
//! When the owning handle is dropped the actor ends and every task it owns
//! is aborted.

use std::future::Future;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::{select, sync::mpsc, task::JoinSet};

use crate::{channel::ChannelHandle, error::AutoAppError};

/// Inbound messages pulled off the channel ahead of the handler.
const INBOUND_CAPACITY: usize = 1;

/// Protocol logic of one channel service.
pub(crate) trait ChannelHandler: Sized + Send + 'static {
   type Inbound: Send + 'static;
   type Outbound: Send + 'static;
   /// Continuations posted back to the actor.
   type Event: Send + 'static;

   /// Prefix used in log lines.
   const NAME: &'static str;

   /// Runs once on the actor before the first message.
   fn on_start(&mut self, cx: &mut Context<Self>) {
      let _ = cx;
   }

   fn handle_message(&mut self, message: Self::Inbound, cx: &mut Context<Self>);

   fn handle_event(&mut self, event: Self::Event, cx: &mut Context<Self>) {
      let _ = (event, cx);
   }

   /// A receive or send failed. Receiving stops only after a receive error.
   fn handle_channel_error(&mut self, error: AutoAppError, cx: &mut Context<Self>) {
      let _ = cx;
      error!("{}: channel error: {error}", Self::NAME);
   }

   /// Halts the driver. Called at most once per service.
   fn stop(&mut self);
}

struct Outgoing<H: ChannelHandler> {
   message: H::Outbound,
   then: Option<H::Event>,
}

/// Handle the actor gives its handler for outbound work.
pub(crate) struct Context<H: ChannelHandler> {
   outbox: mpsc::UnboundedSender<Outgoing<H>>,
   loopback: mpsc::UnboundedSender<H::Event>,
   tasks: JoinSet<()>,
}

impl<H: ChannelHandler> Context<H> {
   /// Queues a message. A failed send is logged and otherwise ignored.
   pub fn send(&mut self, message: H::Outbound) {
      self.enqueue(message, None);
   }

   /// Queues a message and posts `then` back once it was written out.
   pub fn send_then(&mut self, message: H::Outbound, then: H::Event) {
      self.enqueue(message, Some(then));
   }

   fn enqueue(&mut self, message: H::Outbound, then: Option<H::Event>) {
      if self.outbox.send(Outgoing { message, then }).is_err() {
         warn!("{}: writer is gone, dropping outbound message", H::NAME);
      }
   }

   /// Runs `fut` off the actor and delivers its output as an event.
   pub fn spawn<F>(&mut self, fut: F)
   where
      F: Future<Output = H::Event> + Send + 'static,
   {
      while self.tasks.try_join_next().is_some() {}
      let loopback = self.loopback.clone();
      self.tasks.spawn(async move {
         let _ = loopback.send(fut.await);
      });
   }
}

enum Command<O> {
   Send(O),
   Stop,
}

enum RuntimeState<H: ChannelHandler> {
   Idle {
      handler: H,
      channel: ChannelHandle<H::Inbound, H::Outbound>,
   },
   Running {
      commands: mpsc::UnboundedSender<Command<H::Outbound>>,
   },
   Finished,
}

/// Owning handle for a service actor.
///
/// Construction only parks the handler; nothing touches the channel or the
/// driver until [`ServiceRuntime::start`].
pub(crate) struct ServiceRuntime<H: ChannelHandler> {
   state: Mutex<RuntimeState<H>>,
}

impl<H: ChannelHandler> ServiceRuntime<H> {
   pub fn new(handler: H, channel: ChannelHandle<H::Inbound, H::Outbound>) -> Self {
      Self {
         state: Mutex::new(RuntimeState::Idle { handler, channel }),
      }
   }

   pub fn start(&self) {
      let mut state = self.state.lock();
      let (handler, channel) = match std::mem::replace(&mut *state, RuntimeState::Finished) {
         RuntimeState::Idle { handler, channel } => (handler, channel),
         other => {
            *state = other;
            warn!("{}: start ignored, service already started or stopped", H::NAME);
            return;
         },
      };

      let (command_tx, command_rx) = mpsc::unbounded_channel();
      let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
      let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
      let (loopback_tx, loopback_rx) = mpsc::unbounded_channel();
      let (error_tx, error_rx) = mpsc::unbounded_channel();

      let mut tasks = JoinSet::new();
      tasks.spawn(read_loop::<H>(channel.clone(), inbound_tx, error_tx.clone()));
      tasks.spawn(write_loop::<H>(channel, outbox_rx, loopback_tx.clone(), error_tx));

      let cx = Context {
         outbox: outbox_tx,
         loopback: loopback_tx,
         tasks,
      };
      tokio::spawn(run(handler, cx, Inboxes {
         commands: command_rx,
         inbound: inbound_rx,
         events: loopback_rx,
         errors: error_rx,
      }));

      *state = RuntimeState::Running {
         commands: command_tx,
      };
   }

   /// Queues an outbound message from outside the actor.
   pub fn notify(&self, message: H::Outbound) {
      match &*self.state.lock() {
         RuntimeState::Running { commands } => {
            let _ = commands.send(Command::Send(message));
         },
         _ => warn!("{}: not running, dropping outbound message", H::NAME),
      }
   }

   /// Stops the driver on the actor. Repeated calls are no-ops.
   pub fn stop(&self) {
      let mut state = self.state.lock();
      match &*state {
         RuntimeState::Running { commands } => {
            let _ = commands.send(Command::Stop);
         },
         RuntimeState::Idle { .. } => {
            debug!("{}: stopped before start", H::NAME);
            *state = RuntimeState::Finished;
         },
         RuntimeState::Finished => {},
      }
   }
}

async fn read_loop<H: ChannelHandler>(
   channel: ChannelHandle<H::Inbound, H::Outbound>,
   inbound: mpsc::Sender<H::Inbound>,
   errors: mpsc::UnboundedSender<AutoAppError>,
) {
   loop {
      match channel.receive().await {
         Ok(message) => {
            if inbound.send(message).await.is_err() {
               return;
            }
         },
         Err(e) => {
            let _ = errors.send(e);
            return;
         },
      }
   }
}

async fn write_loop<H: ChannelHandler>(
   channel: ChannelHandle<H::Inbound, H::Outbound>,
   mut outbox: mpsc::UnboundedReceiver<Outgoing<H>>,
   loopback: mpsc::UnboundedSender<H::Event>,
   errors: mpsc::UnboundedSender<AutoAppError>,
) {
   while let Some(Outgoing { message, then }) = outbox.recv().await {
      match channel.send(message).await {
         Ok(()) => {
            if let Some(event) = then {
               let _ = loopback.send(event);
            }
         },
         Err(e) => {
            let _ = errors.send(e);
         },
      }
   }
}

struct Inboxes<H: ChannelHandler> {
   commands: mpsc::UnboundedReceiver<Command<H::Outbound>>,
   inbound: mpsc::Receiver<H::Inbound>,
   events: mpsc::UnboundedReceiver<H::Event>,
   errors: mpsc::UnboundedReceiver<AutoAppError>,
}

async fn run<H: ChannelHandler>(mut handler: H, mut cx: Context<H>, inboxes: Inboxes<H>) {
   let Inboxes {
      mut commands,
      mut inbound,
      mut events,
      mut errors,
   } = inboxes;

   info!("{}: start", H::NAME);
   handler.on_start(&mut cx);
   let mut stopped = false;

   loop {
      select! {
         biased;
         cmd = commands.recv() => match cmd {
            Some(Command::Send(message)) => cx.send(message),
            Some(Command::Stop) if stopped => {
               debug!("{}: already stopped", H::NAME);
            },
            Some(Command::Stop) => {
               info!("{}: stop", H::NAME);
               stopped = true;
               handler.stop();
            },
            None => break,
         },
         Some(event) = events.recv() => handler.handle_event(event, &mut cx),
         Some(message) = inbound.recv() => handler.handle_message(message, &mut cx),
         Some(error) = errors.recv() => handler.handle_channel_error(error, &mut cx),
      }
   }

   debug!("{}: service released", H::NAME);
}
