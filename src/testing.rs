//! Mock collaborators shared by the unit tests.

use std::{
   any::Any,
   collections::HashSet,
   sync::{
      Arc,
      atomic::{AtomicBool, AtomicUsize, Ordering},
   },
   time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::{
   sync::{Semaphore, mpsc},
   time,
};

use crate::{
   channel::{
      AudioChannel, AudioStream, AvInputChannel, BluetoothChannel, Channel, ControlChannel,
      InputChannel, Messenger, VideoChannel,
   },
   completion::{Completion, Resolver},
   config::Config,
   driver::{AudioInput, AudioOutput, BluetoothDevice, DriverFactory, InputDevice, VideoOutput},
   error::{AutoAppError, Result},
   protocol::{
      ButtonCode, ChannelId, ControlInbound, ControlOutbound, InputEvent, Timestamp, VideoFps,
      VideoResolution,
   },
   session::{Session, SessionFactory, SessionObserver},
   transport::{AccessoryDevice, AccessoryEnumerator, Transport, UsbHub},
};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn init_logger() {
   let _ = env_logger::builder().is_test(true).try_init();
}

/// Polls `cond` until it holds, yielding to the runtime in between.
pub(crate) async fn eventually(cond: impl Fn() -> bool) {
   for _ in 0..1000 {
      if cond() {
         return;
      }
      time::sleep(Duration::from_millis(1)).await;
   }
   panic!("condition not reached");
}

// === Channels ===

pub(crate) struct MockChannel<I, O> {
   id: ChannelId,
   inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<I>>,
   outbound: mpsc::UnboundedSender<O>,
   fail_sends: AtomicBool,
   send_gate: Option<Arc<Semaphore>>,
   receives: AtomicUsize,
}

impl<I, O> MockChannel<I, O> {
   pub fn fail_sends(&self, fail: bool) {
      self.fail_sends.store(fail, Ordering::SeqCst);
   }

   /// Messages the service has pulled off this channel so far.
   pub fn receives(&self) -> usize {
      self.receives.load(Ordering::SeqCst)
   }
}

impl<I: Send, O: Send> Channel<I, O> for MockChannel<I, O> {
   fn id(&self) -> ChannelId {
      self.id
   }

   fn receive(&self) -> BoxFuture<'_, Result<I>> {
      async move {
         let message = self
            .inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or(AutoAppError::ChannelClosed)?;
         self.receives.fetch_add(1, Ordering::SeqCst);
         Ok(message)
      }
      .boxed()
   }

   fn send(&self, message: O) -> BoxFuture<'_, Result<()>> {
      async move {
         let _ = self.outbound.send(message);
         if let Some(gate) = &self.send_gate {
            gate
               .acquire()
               .await
               .map_err(|_| AutoAppError::ChannelClosed)?
               .forget();
         }
         if self.fail_sends.load(Ordering::SeqCst) {
            return Err(AutoAppError::Transport("send refused".into()));
         }
         Ok(())
      }
      .boxed()
   }
}

/// The phone's side of a mock channel.
pub(crate) struct PeerEnd<I, O> {
   to_service: mpsc::UnboundedSender<I>,
   from_service: mpsc::UnboundedReceiver<O>,
}

impl<I, O> PeerEnd<I, O> {
   pub fn push(&self, message: I) {
      self.to_service.send(message).ok().expect("service side dropped");
   }

   /// Next message the service submitted for sending.
   pub async fn next(&mut self) -> O {
      time::timeout(RECV_TIMEOUT, self.from_service.recv())
         .await
         .expect("timed out waiting for service message")
         .expect("service side dropped")
   }

   /// Asserts nothing is sent within a short grace period.
   pub async fn assert_silent(&mut self) {
      let res = time::timeout(Duration::from_millis(50), self.from_service.recv()).await;
      assert!(res.is_err(), "unexpected message from service");
   }
}

pub(crate) fn mock_channel<I, O>(id: ChannelId) -> (Arc<MockChannel<I, O>>, PeerEnd<I, O>) {
   build_channel(id, None)
}

/// Channel whose sends complete only when the returned semaphore gets permits.
pub(crate) fn gated_channel<I, O>(
   id: ChannelId,
) -> (Arc<MockChannel<I, O>>, PeerEnd<I, O>, Arc<Semaphore>) {
   let gate = Arc::new(Semaphore::new(0));
   let (channel, peer) = build_channel(id, Some(gate.clone()));
   (channel, peer, gate)
}

fn build_channel<I, O>(
   id: ChannelId,
   send_gate: Option<Arc<Semaphore>>,
) -> (Arc<MockChannel<I, O>>, PeerEnd<I, O>) {
   let (to_service, inbound) = mpsc::unbounded_channel();
   let (outbound, from_service) = mpsc::unbounded_channel();
   let channel = Arc::new(MockChannel {
      id,
      inbound: tokio::sync::Mutex::new(inbound),
      outbound,
      fail_sends: AtomicBool::new(false),
      send_gate,
      receives: AtomicUsize::new(0),
   });
   (channel, PeerEnd {
      to_service,
      from_service,
   })
}

/// Messenger handing out mock channels. The control channel's peer end can
/// be taken by the test; every other peer end is kept alive but unused.
#[derive(Default)]
pub(crate) struct MockMessenger {
   control: Mutex<Option<PeerEnd<ControlInbound, ControlOutbound>>>,
   parked: Mutex<Vec<Box<dyn Any + Send>>>,
}

impl MockMessenger {
   pub fn take_control(&self) -> PeerEnd<ControlInbound, ControlOutbound> {
      self.control.lock().take().expect("control channel not bound")
   }

   fn bind<I: Send + 'static, O: Send + 'static>(
      &self,
      id: ChannelId,
   ) -> Arc<MockChannel<I, O>> {
      let (channel, peer) = mock_channel(id);
      self.parked.lock().push(Box::new(peer));
      channel
   }
}

impl Messenger for MockMessenger {
   fn control_channel(&self) -> ControlChannel {
      let (channel, peer) = mock_channel(ChannelId::Control);
      *self.control.lock() = Some(peer);
      channel
   }

   fn video_channel(&self) -> VideoChannel {
      self.bind(ChannelId::Video)
   }

   fn audio_channel(&self, stream: AudioStream) -> AudioChannel {
      self.bind(stream.channel_id())
   }

   fn av_input_channel(&self) -> AvInputChannel {
      self.bind(ChannelId::AvInput)
   }

   fn input_channel(&self) -> InputChannel {
      self.bind(ChannelId::Input)
   }

   fn bluetooth_channel(&self) -> BluetoothChannel {
      self.bind(ChannelId::Bluetooth)
   }
}

// === Drivers ===

pub(crate) struct MockVideoOutput {
   pub open_ok: AtomicBool,
   pub init_ok: AtomicBool,
   pub opens: AtomicUsize,
   pub inits: AtomicUsize,
   pub stops: AtomicUsize,
   pub writes: Mutex<Vec<(Timestamp, Vec<u8>)>>,
   /// Held by a test to block `write` on the calling thread.
   pub write_gate: Mutex<()>,
}

impl Default for MockVideoOutput {
   fn default() -> Self {
      Self {
         open_ok: AtomicBool::new(true),
         init_ok: AtomicBool::new(true),
         opens: AtomicUsize::new(0),
         inits: AtomicUsize::new(0),
         stops: AtomicUsize::new(0),
         writes: Mutex::new(Vec::new()),
         write_gate: Mutex::new(()),
      }
   }
}

impl VideoOutput for MockVideoOutput {
   fn open(&self) -> bool {
      self.opens.fetch_add(1, Ordering::SeqCst);
      self.open_ok.load(Ordering::SeqCst)
   }

   fn init(&self) -> bool {
      self.inits.fetch_add(1, Ordering::SeqCst);
      self.init_ok.load(Ordering::SeqCst)
   }

   fn write(&self, timestamp: Timestamp, data: &[u8]) {
      let _gate = self.write_gate.lock();
      self.writes.lock().push((timestamp, data.to_vec()));
   }

   fn stop(&self) {
      self.stops.fetch_add(1, Ordering::SeqCst);
   }

   fn resolution(&self) -> VideoResolution {
      VideoResolution::Hd720p
   }

   fn fps(&self) -> VideoFps {
      VideoFps::Fps60
   }

   fn margins(&self) -> (u32, u32) {
      (10, 20)
   }

   fn screen_dpi(&self) -> u32 {
      160
   }
}

#[derive(Default)]
pub(crate) struct MockAudioOutput {
   pub opens: AtomicUsize,
   pub starts: AtomicUsize,
   pub suspends: AtomicUsize,
   pub stops: AtomicUsize,
   pub writes: Mutex<Vec<(Timestamp, Vec<u8>)>>,
}

impl AudioOutput for MockAudioOutput {
   fn open(&self) -> bool {
      self.opens.fetch_add(1, Ordering::SeqCst);
      true
   }

   fn init(&self) -> bool {
      true
   }

   fn write(&self, timestamp: Timestamp, data: &[u8]) {
      self.writes.lock().push((timestamp, data.to_vec()));
   }

   fn start(&self) {
      self.starts.fetch_add(1, Ordering::SeqCst);
   }

   fn suspend(&self) {
      self.suspends.fetch_add(1, Ordering::SeqCst);
   }

   fn stop(&self) {
      self.stops.fetch_add(1, Ordering::SeqCst);
   }

   fn sample_rate(&self) -> u32 {
      48000
   }

   fn sample_size(&self) -> u32 {
      16
   }

   fn channel_count(&self) -> u32 {
      2
   }
}

/// Audio capture whose chunks are fed by the test.
pub(crate) struct MockAudioInput {
   pub start_ok: AtomicBool,
   active: Arc<AtomicBool>,
   pub starts: AtomicUsize,
   pub stops: AtomicUsize,
   pub reads: Arc<AtomicUsize>,
   chunks: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Option<Vec<u8>>>>>,
   feed: mpsc::UnboundedSender<Option<Vec<u8>>>,
}

impl Default for MockAudioInput {
   fn default() -> Self {
      let (feed, chunks) = mpsc::unbounded_channel();
      Self {
         start_ok: AtomicBool::new(true),
         active: Arc::new(AtomicBool::new(false)),
         starts: AtomicUsize::new(0),
         stops: AtomicUsize::new(0),
         reads: Arc::new(AtomicUsize::new(0)),
         chunks: Arc::new(tokio::sync::Mutex::new(chunks)),
         feed,
      }
   }
}

impl MockAudioInput {
   /// Completes the next pending read with `data`.
   pub fn feed(&self, data: &[u8]) {
      let _ = self.feed.send(Some(data.to_vec()));
   }

   /// Makes the next pending read fail.
   pub fn fail_read(&self) {
      let _ = self.feed.send(None);
   }

   pub fn reads(&self) -> usize {
      self.reads.load(Ordering::SeqCst)
   }
}

impl AudioInput for MockAudioInput {
   fn open(&self) -> bool {
      true
   }

   fn is_active(&self) -> bool {
      self.active.load(Ordering::SeqCst)
   }

   fn start(&self) -> BoxFuture<'static, Result<()>> {
      self.starts.fetch_add(1, Ordering::SeqCst);
      let ok = self.start_ok.load(Ordering::SeqCst);
      let active = self.active.clone();
      async move {
         if ok {
            active.store(true, Ordering::SeqCst);
            Ok(())
         } else {
            Err(AutoAppError::Driver("capture device busy".into()))
         }
      }
      .boxed()
   }

   fn read(&self) -> BoxFuture<'static, Result<Vec<u8>>> {
      self.reads.fetch_add(1, Ordering::SeqCst);
      let chunks = self.chunks.clone();
      async move {
         chunks
            .lock()
            .await
            .recv()
            .await
            .flatten()
            .ok_or_else(|| AutoAppError::Driver("read rejected".into()))
      }
      .boxed()
   }

   fn stop(&self) {
      self.stops.fetch_add(1, Ordering::SeqCst);
      self.active.store(false, Ordering::SeqCst);
   }

   fn sample_rate(&self) -> u32 {
      16000
   }

   fn sample_size(&self) -> u32 {
      16
   }

   fn channel_count(&self) -> u32 {
      1
   }
}

pub(crate) struct MockInputDevice {
   pub buttons: Vec<ButtonCode>,
   pub touchscreen: bool,
   pub stops: AtomicUsize,
   events: Mutex<Option<mpsc::UnboundedSender<InputEvent>>>,
}

impl MockInputDevice {
   pub fn new(buttons: Vec<ButtonCode>, touchscreen: bool) -> Self {
      Self {
         buttons,
         touchscreen,
         stops: AtomicUsize::new(0),
         events: Mutex::new(None),
      }
   }

   pub fn is_started(&self) -> bool {
      self.events.lock().is_some()
   }

   pub fn emit(&self, event: InputEvent) {
      if let Some(events) = self.events.lock().as_ref() {
         let _ = events.send(event);
      }
   }
}

impl InputDevice for MockInputDevice {
   fn start(&self, events: mpsc::UnboundedSender<InputEvent>) {
      *self.events.lock() = Some(events);
   }

   fn stop(&self) {
      self.stops.fetch_add(1, Ordering::SeqCst);
      self.events.lock().take();
   }

   fn supported_buttons(&self) -> Vec<ButtonCode> {
      self.buttons.clone()
   }

   fn has_touchscreen(&self) -> bool {
      self.touchscreen
   }

   fn touchscreen_geometry(&self) -> (u32, u32) {
      (800, 480)
   }
}

pub(crate) struct MockBluetooth {
   pub available: bool,
   pub paired: Mutex<HashSet<SmolStr>>,
   pub stops: AtomicUsize,
}

impl MockBluetooth {
   pub fn new(available: bool) -> Self {
      Self {
         available,
         paired: Mutex::new(HashSet::new()),
         stops: AtomicUsize::new(0),
      }
   }
}

impl BluetoothDevice for MockBluetooth {
   fn stop(&self) {
      self.stops.fetch_add(1, Ordering::SeqCst);
   }

   fn is_available(&self) -> bool {
      self.available
   }

   fn local_address(&self) -> SmolStr {
      SmolStr::new_static("AA:BB:CC:DD:EE:FF")
   }

   fn is_paired(&self, address: &str) -> BoxFuture<'static, bool> {
      let paired = self.paired.lock().contains(address);
      async move { paired }.boxed()
   }
}

pub(crate) struct MockDriverFactory {
   pub local_bluetooth: Option<Arc<MockBluetooth>>,
}

impl DriverFactory for MockDriverFactory {
   fn video_output(&self, _config: &Config) -> Arc<dyn VideoOutput> {
      Arc::new(MockVideoOutput::default())
   }

   fn audio_output(&self, _config: &Config, _stream: AudioStream) -> Arc<dyn AudioOutput> {
      Arc::new(MockAudioOutput::default())
   }

   fn audio_input(&self, _config: &Config) -> Arc<dyn AudioInput> {
      Arc::new(MockAudioInput::default())
   }

   fn input_device(&self, config: &Config) -> Arc<dyn InputDevice> {
      Arc::new(MockInputDevice::new(
         config.input.button_codes.clone(),
         config.input.touchscreen_enabled,
      ))
   }

   fn local_bluetooth(&self) -> Option<Arc<dyn BluetoothDevice>> {
      self
         .local_bluetooth
         .clone()
         .map(|bt| bt as Arc<dyn BluetoothDevice>)
   }
}

// === Discovery and sessions ===

/// Accessory handle that records when it is released.
#[derive(Debug)]
pub(crate) struct MockAccessory {
   name: String,
   closed: Arc<AtomicBool>,
}

impl MockAccessory {
   pub fn new(name: &str) -> (Self, Arc<AtomicBool>) {
      let closed = Arc::new(AtomicBool::new(false));
      (
         Self {
            name: name.to_owned(),
            closed: closed.clone(),
         },
         closed,
      )
   }
}

impl Drop for MockAccessory {
   fn drop(&mut self) {
      self.closed.store(true, Ordering::SeqCst);
   }
}

impl AccessoryDevice for MockAccessory {
   fn describe(&self) -> String {
      self.name.clone()
   }
}

#[derive(Default)]
pub(crate) struct MockHub {
   pub waits: AtomicUsize,
   pub cancels: AtomicUsize,
   pending: Mutex<Option<Resolver<Box<dyn AccessoryDevice>>>>,
}

impl MockHub {
   fn take_pending(&self) -> Resolver<Box<dyn AccessoryDevice>> {
      self.pending.lock().take().expect("no device wait pending")
   }

   pub fn arrive(&self, device: MockAccessory) {
      self.take_pending().resolve(Box::new(device));
   }

   pub fn fail(&self, error: AutoAppError) {
      self.take_pending().reject(error);
   }

   /// Aborts the pending wait as if the hub itself cancelled it.
   pub fn cancel_pending(&self) {
      self.take_pending().abort();
   }

   /// Takes the pending wait out of the hub, so a later arrival races
   /// with whatever cancellation the supervisor issues meanwhile.
   pub fn detach_pending(&self) -> Resolver<Box<dyn AccessoryDevice>> {
      self.take_pending()
   }
}

impl UsbHub for MockHub {
   fn wait_for_device(&self) -> Completion<Box<dyn AccessoryDevice>> {
      self.waits.fetch_add(1, Ordering::SeqCst);
      let (resolver, completion) = Completion::new();
      let mut pending = self.pending.lock();
      if pending.is_some() {
         resolver.reject(AutoAppError::OperationInProgress);
      } else {
         *pending = Some(resolver);
      }
      completion
   }

   fn cancel(&self) {
      self.cancels.fetch_add(1, Ordering::SeqCst);
      if let Some(resolver) = self.pending.lock().take() {
         resolver.abort();
      }
   }
}

#[derive(Default)]
pub(crate) struct MockEnumerator {
   pub runs: AtomicUsize,
   pub cancels: AtomicUsize,
   pending: Mutex<Option<Resolver<usize>>>,
}

impl AccessoryEnumerator for MockEnumerator {
   fn enumerate(&self) -> Completion<usize> {
      self.runs.fetch_add(1, Ordering::SeqCst);
      let (resolver, completion) = Completion::new();
      let mut pending = self.pending.lock();
      if pending.is_some() {
         resolver.reject(AutoAppError::OperationInProgress);
      } else {
         *pending = Some(resolver);
      }
      completion
   }

   fn cancel(&self) {
      self.cancels.fetch_add(1, Ordering::SeqCst);
      if let Some(resolver) = self.pending.lock().take() {
         resolver.abort();
      }
   }
}

/// What a test can observe of a session built by [`MockSessionFactory`].
pub(crate) struct MockSessionProbe {
   pub transport: String,
   pub starts: AtomicUsize,
   pub stops: AtomicUsize,
   observer: Mutex<Option<Arc<dyn SessionObserver>>>,
}

impl MockSessionProbe {
   /// Reports the end of the session as the phone would cause it.
   pub fn end(&self) {
      let observer = self.observer.lock().clone();
      if let Some(observer) = observer {
         observer.on_session_ended();
      }
   }
}

struct MockSession {
   probe: Arc<MockSessionProbe>,
   fail_start: bool,
   _transport: Transport,
}

impl Session for MockSession {
   fn start(&mut self, observer: Arc<dyn SessionObserver>) -> Result<()> {
      self.probe.starts.fetch_add(1, Ordering::SeqCst);
      *self.probe.observer.lock() = Some(observer);
      if self.fail_start {
         return Err(AutoAppError::Transport("handshake failed".into()));
      }
      Ok(())
   }

   fn stop(&mut self) {
      self.probe.stops.fetch_add(1, Ordering::SeqCst);
   }
}

#[derive(Default)]
pub(crate) struct MockSessionFactory {
   pub fail_create: AtomicBool,
   pub fail_start: AtomicBool,
   created: Mutex<Vec<Arc<MockSessionProbe>>>,
}

impl MockSessionFactory {
   pub fn created(&self) -> Vec<Arc<MockSessionProbe>> {
      self.created.lock().clone()
   }
}

impl SessionFactory for MockSessionFactory {
   fn create(&self, transport: Transport) -> Result<Box<dyn Session>> {
      if self.fail_create.load(Ordering::SeqCst) {
         return Err(AutoAppError::Transport("messenger bind failed".into()));
      }
      let probe = Arc::new(MockSessionProbe {
         transport: transport.to_string(),
         starts: AtomicUsize::new(0),
         stops: AtomicUsize::new(0),
         observer: Mutex::new(None),
      });
      self.created.lock().push(probe.clone());
      Ok(Box::new(MockSession {
         probe,
         fail_start: self.fail_start.load(Ordering::SeqCst),
         _transport: transport,
      }))
   }
}
