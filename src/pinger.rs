//! Heartbeat watchdog.
//!
//! Each `ping()` arms a deadline. When it expires the heartbeat is judged
//! healthy as long as no more than one ping went unanswered, so a single
//! late pong is tolerated and two consecutive misses fail the check.

use std::time::Duration;

use log::{debug, warn};
use tokio::{select, sync::mpsc, task::JoinSet, time};

use crate::{
   completion::{Completion, Resolver},
   error::AutoAppError,
};

#[derive(Debug)]
enum PingerCommand {
   Ping(Resolver<()>),
   Pong,
   Cancel,
}

/// Handle to a watchdog actor. Dropping every handle aborts an outstanding ping.
#[derive(Debug, Clone)]
pub struct Pinger {
   inbox: mpsc::UnboundedSender<PingerCommand>,
}

impl Pinger {
   pub fn new(duration: Duration) -> Self {
      let (inbox, commands) = mpsc::unbounded_channel();
      tokio::spawn(PingerActor::new(duration).run(commands));
      Self { inbox }
   }

   /// Arms the deadline.
   ///
   /// Fails at once with [`AutoAppError::OperationInProgress`] if a ping is
   /// already outstanding; the outstanding one is left alone.
   pub fn ping(&self) -> Completion<()> {
      let (resolver, completion) = Completion::new();
      // A closed inbox drops the resolver, which reads as aborted.
      let _ = self.inbox.send(PingerCommand::Ping(resolver));
      completion
   }

   /// Records an answer from the peer. Not tied to any particular ping.
   pub fn pong(&self) {
      let _ = self.inbox.send(PingerCommand::Pong);
   }

   /// Aborts the outstanding ping, if any.
   pub fn cancel(&self) {
      let _ = self.inbox.send(PingerCommand::Cancel);
   }
}

struct PingerActor {
   duration: Duration,
   pings: u64,
   pongs: u64,
   cancelled: bool,
   pending: Option<Resolver<()>>,
   generation: u64,
   timers: JoinSet<u64>,
}

impl PingerActor {
   fn new(duration: Duration) -> Self {
      Self {
         duration,
         pings: 0,
         pongs: 0,
         cancelled: false,
         pending: None,
         generation: 0,
         timers: JoinSet::new(),
      }
   }

   async fn run(mut self, mut commands: mpsc::UnboundedReceiver<PingerCommand>) {
      loop {
         select! {
            biased;
            cmd = commands.recv() => match cmd {
               Some(cmd) => self.handle_command(cmd),
               None => break,
            },
            Some(res) = self.timers.join_next() => {
               if let Ok(generation) = res {
                  self.on_expired(generation);
               }
            },
         }
      }
      debug!("pinger: released");
   }

   fn handle_command(&mut self, cmd: PingerCommand) {
      match cmd {
         PingerCommand::Ping(resolver) => {
            self.cancelled = false;
            if self.pending.is_some() {
               warn!("pinger: ping already in progress");
               resolver.reject(AutoAppError::OperationInProgress);
               return;
            }
            self.pings += 1;
            self.generation += 1;
            self.pending = Some(resolver);

            let generation = self.generation;
            let duration = self.duration;
            self.timers.spawn(async move {
               time::sleep(duration).await;
               generation
            });
         },
         PingerCommand::Pong => self.pongs += 1,
         PingerCommand::Cancel => {
            self.cancelled = true;
            self.timers.abort_all();
            if let Some(resolver) = self.pending.take() {
               debug!("pinger: outstanding ping cancelled");
               resolver.abort();
            }
         },
      }
   }

   fn on_expired(&mut self, generation: u64) {
      if generation != self.generation {
         return;
      }
      let Some(resolver) = self.pending.take() else {
         return;
      };

      let unanswered = self.pings.saturating_sub(self.pongs);
      if self.cancelled {
         resolver.abort();
      } else if unanswered > 1 {
         warn!("pinger: {unanswered} pings unanswered");
         resolver.reject(AutoAppError::HeartbeatMissed);
      } else {
         resolver.resolve(());
      }
   }
}
