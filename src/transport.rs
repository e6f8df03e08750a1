//! Transports a session can run over, and the primitives that find them.

use std::{fmt, time::Duration};

use log::{debug, info, warn};
use tokio::{
   net::{TcpListener, TcpStream},
   task::JoinHandle,
   time,
};

use crate::{completion::Completion, supervisor::Supervisor};

/// Delay before accepting again after a failed accept.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A USB device that has been switched into accessory mode.
///
/// Dropping the handle releases the device.
pub trait AccessoryDevice: Send + Sync + fmt::Debug {
   /// Short human readable identification, used in logs.
   fn describe(&self) -> String;
}

/// An established connection to a phone.
#[derive(Debug)]
pub enum Transport {
   Usb(Box<dyn AccessoryDevice>),
   Tcp(TcpStream),
}

impl Transport {
   /// Releases the underlying device or socket.
   pub fn close(self) {
      debug!("transport: closing {self}");
   }
}

impl fmt::Display for Transport {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Self::Usb(device) => write!(f, "usb {}", device.describe()),
         Self::Tcp(stream) => match stream.peer_addr() {
            Ok(addr) => write!(f, "tcp {addr}"),
            Err(_) => f.write_str("tcp <unknown peer>"),
         },
      }
   }
}

/// Waits for a phone to be plugged in and switched to accessory mode.
pub trait UsbHub: Send + Sync {
   /// Resolves with the first accessory that shows up. Only one wait may be
   /// outstanding; a second one fails with `OperationInProgress`.
   fn wait_for_device(&self) -> Completion<Box<dyn AccessoryDevice>>;

   /// Aborts the outstanding wait. No-op when nothing is pending.
   fn cancel(&self);
}

/// Switches phones that were already connected at startup into accessory mode.
pub trait AccessoryEnumerator: Send + Sync {
   /// Resolves with the number of devices that were asked to switch. The
   /// switched devices then arrive through the [`UsbHub`].
   fn enumerate(&self) -> Completion<usize>;

   /// Aborts the outstanding enumeration. No-op when nothing is pending.
   fn cancel(&self);
}

/// Accepts wireless connections and hands each one to `supervisor`.
///
/// The task ends when the supervisor is gone.
pub fn spawn_tcp_acceptor(listener: TcpListener, supervisor: Supervisor) -> JoinHandle<()> {
   tokio::spawn(async move {
      if let Ok(addr) = listener.local_addr() {
         info!("transport: listening on {addr}");
      }
      loop {
         let stream = match listener.accept().await {
            Ok((stream, addr)) => {
               info!("transport: connection from {addr}");
               stream
            },
            Err(e) => {
               warn!("transport: accept failed: {e}");
               time::sleep(ACCEPT_RETRY_DELAY).await;
               continue;
            },
         };
         if let Err(e) = stream.set_nodelay(true) {
            warn!("transport: failed to disable nagle: {e}");
         }
         if supervisor
            .accept_incoming_connection(Transport::Tcp(stream))
            .is_err()
         {
            info!("transport: supervisor gone, acceptor exiting");
            return;
         }
      }
   })
}
