//! Bluetooth pairing status service.
//!
//! Answers whether the phone is already paired with the head unit's adapter.
//! Pairing itself is left to whoever owns the adapter; this service only
//! queries.

use std::sync::Arc;

use log::info;
use smol_str::SmolStr;

use crate::{
   channel::BluetoothChannel,
   driver::BluetoothDevice,
   protocol::{
      BluetoothInbound, BluetoothOutbound, BluetoothPairingResponse, ChannelDescriptorKind,
      ChannelId, ChannelOpenResponse, ServiceDiscoveryResponse, Status,
   },
   service::{
      Service,
      runtime::{ChannelHandler, Context, ServiceRuntime},
   },
};

enum BluetoothEvent {
   PairingChecked { address: SmolStr, paired: bool },
}

struct BluetoothHandler {
   device: Arc<dyn BluetoothDevice>,
}

impl ChannelHandler for BluetoothHandler {
   type Inbound = BluetoothInbound;
   type Outbound = BluetoothOutbound;
   type Event = BluetoothEvent;

   const NAME: &'static str = "bluetooth";

   fn handle_message(&mut self, message: BluetoothInbound, cx: &mut Context<Self>) {
      match message {
         BluetoothInbound::OpenRequest(request) => {
            info!("bluetooth: open request, priority: {}", request.priority);
            cx.send(BluetoothOutbound::OpenResponse(ChannelOpenResponse { status: Status::Ok }));
         },
         BluetoothInbound::PairingRequest(request) => {
            info!(
               "bluetooth: pairing request, address: {}, method: {}",
               request.phone_address, request.pairing_method
            );
            let lookup = self.device.is_paired(&request.phone_address);
            let address = request.phone_address;
            cx.spawn(async move {
               BluetoothEvent::PairingChecked {
                  address,
                  paired: lookup.await,
               }
            });
         },
      }
   }

   fn handle_event(&mut self, event: BluetoothEvent, cx: &mut Context<Self>) {
      match event {
         BluetoothEvent::PairingChecked { address, paired } => {
            info!("bluetooth: {address} already paired: {paired}");
            cx.send(BluetoothOutbound::PairingResponse(BluetoothPairingResponse {
               already_paired: paired,
               status: Status::from_success(paired),
            }));
         },
      }
   }

   fn stop(&mut self) {
      self.device.stop();
   }
}

pub struct BluetoothService {
   channel_id: ChannelId,
   device: Arc<dyn BluetoothDevice>,
   runtime: ServiceRuntime<BluetoothHandler>,
}

impl BluetoothService {
   pub fn new(channel: BluetoothChannel, device: Arc<dyn BluetoothDevice>) -> Self {
      let handler = BluetoothHandler {
         device: device.clone(),
      };
      Self {
         channel_id: channel.id(),
         device,
         runtime: ServiceRuntime::new(handler, channel),
      }
   }
}

impl Service for BluetoothService {
   fn start(&self) {
      self.runtime.start();
   }

   fn stop(&self) {
      self.runtime.stop();
   }

   fn fill_features(&self, response: &mut ServiceDiscoveryResponse) {
      info!("bluetooth: fill features");
      if !self.device.is_available() {
         info!("bluetooth: adapter unavailable, channel not advertised");
         return;
      }
      let adapter_address = self.device.local_address();
      info!("bluetooth: adapter address {adapter_address}");
      response.add_channel(self.channel_id, ChannelDescriptorKind::Bluetooth { adapter_address });
   }
}
