//! BlueZ-backed driver for the head unit's own adapter.

use std::str::FromStr;

use bluer::{Adapter, Address, Session};
use futures::{FutureExt, future::BoxFuture};
use log::{debug, info, warn};
use smol_str::{SmolStr, ToSmolStr};

use crate::{driver::BluetoothDevice, error::Result};

/// Local adapter driver.
///
/// The adapter is brought up once at startup and outlives every session,
/// so stopping a session's bluetooth service leaves it powered.
pub struct LocalBluetoothDevice {
   adapter: Adapter,
   address: SmolStr,
   _session: Session,
}

impl LocalBluetoothDevice {
   /// Opens the default BlueZ adapter, powering it on and making it pairable.
   pub async fn new() -> Result<Self> {
      let session = Session::new().await?;
      let adapter = session.default_adapter().await?;
      let name = adapter.name().to_smolstr();
      info!("bluetooth: initializing adapter {name}");

      if !adapter.is_powered().await? {
         adapter.set_powered(true).await?;
         info!("bluetooth: powered on adapter {name}");
      }

      if let Err(e) = adapter.set_pairable(true).await {
         warn!("bluetooth: failed to make adapter {name} pairable: {e}");
      }
      if let Err(e) = adapter.set_discoverable(true).await {
         warn!("bluetooth: failed to make adapter {name} discoverable: {e}");
      }

      let address = adapter.address().await?.to_smolstr();
      info!("bluetooth: adapter {name} ready at {address}");

      Ok(Self {
         adapter,
         address,
         _session: session,
      })
   }
}

impl BluetoothDevice for LocalBluetoothDevice {
   fn stop(&self) {
      debug!("bluetooth: local adapter {} left running", self.address);
   }

   fn is_available(&self) -> bool {
      true
   }

   fn local_address(&self) -> SmolStr {
      self.address.clone()
   }

   fn is_paired(&self, address: &str) -> BoxFuture<'static, bool> {
      let adapter = self.adapter.clone();
      let address = address.to_smolstr();
      async move {
         let Ok(addr) = Address::from_str(&address) else {
            warn!("bluetooth: malformed peer address {address}");
            return false;
         };
         match adapter.device(addr) {
            Ok(device) => device.is_paired().await.unwrap_or(false),
            Err(e) => {
               debug!("bluetooth: no device entry for {addr}: {e}");
               false
            },
         }
      }
      .boxed()
   }
}
