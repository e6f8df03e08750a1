//! Single-use completion handles.
//!
//! A `Completion<T>` resolves exactly once with an [`Outcome`]. Cancellation
//! is a distinct variant so callers never mistake a deliberate abort for a
//! fault that needs recovery.

use std::{
   future::Future,
   pin::Pin,
   task::{Context, Poll},
};

use tokio::sync::oneshot;

use crate::error::{AutoAppError, Result};

/// Result of an asynchronous operation observed through a completion handle.
#[derive(Debug)]
pub enum Outcome<T> {
   Resolved(T),
   /// Cancelled on request. Not an error.
   Aborted,
   Failed(AutoAppError),
}

impl<T> Outcome<T> {
   pub const fn is_resolved(&self) -> bool {
      matches!(self, Self::Resolved(_))
   }

   pub const fn is_aborted(&self) -> bool {
      matches!(self, Self::Aborted)
   }

   pub fn into_result(self) -> Result<T> {
      match self {
         Self::Resolved(value) => Ok(value),
         Self::Aborted => Err(AutoAppError::OperationAborted),
         Self::Failed(e) => Err(e),
      }
   }
}

impl<T> From<Result<T>> for Outcome<T> {
   fn from(result: Result<T>) -> Self {
      match result {
         Ok(value) => Self::Resolved(value),
         Err(AutoAppError::OperationAborted) => Self::Aborted,
         Err(e) => Self::Failed(e),
      }
   }
}

/// Resolving half of a completion handle.
#[derive(Debug)]
pub struct Resolver<T>(oneshot::Sender<Outcome<T>>);

impl<T> Resolver<T> {
   pub fn resolve(self, value: T) {
      let _ = self.0.send(Outcome::Resolved(value));
   }

   pub fn abort(self) {
      let _ = self.0.send(Outcome::Aborted);
   }

   pub fn reject(self, error: AutoAppError) {
      let _ = self.0.send(Outcome::Failed(error));
   }
}

/// Observing half of a completion handle.
///
/// If the resolver is dropped without being used the completion reads as
/// [`Outcome::Aborted`], which is what happens when the owning actor shuts down.
#[derive(Debug)]
pub struct Completion<T>(oneshot::Receiver<Outcome<T>>);

impl<T> Completion<T> {
   pub fn new() -> (Resolver<T>, Self) {
      let (tx, rx) = oneshot::channel();
      (Resolver(tx), Self(rx))
   }
}

impl<T> Future for Completion<T> {
   type Output = Outcome<T>;

   fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
      Pin::new(&mut self.0)
         .poll(cx)
         .map(|res| res.unwrap_or(Outcome::Aborted))
   }
}
