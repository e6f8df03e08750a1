//! Typed protocol messages exchanged over the multiplexed channels.
//!
//! These are the decoded forms handed to and from the messenger substrate.
//! Their byte encoding belongs to the substrate and is not defined here.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

pub type SessionId = i32;
/// Microseconds since the Unix epoch.
pub type Timestamp = u64;

pub fn timestamp_now() -> Timestamp {
   SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map_or(0, |d| d.as_micros().try_into().unwrap_or(u64::MAX))
}

/// Logical channels multiplexed over one transport connection.
#[repr(u8)]
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   Hash,
   strum::FromRepr,
   strum::Display,
   strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum ChannelId {
   Control = 0,
   Input = 1,
   Sensor = 2,
   Video = 3,
   MediaAudio = 4,
   SpeechAudio = 5,
   SystemAudio = 6,
   AvInput = 7,
   Bluetooth = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Status {
   Ok,
   Fail,
}

impl Status {
   pub const fn from_success(ok: bool) -> Self {
      if ok { Self::Ok } else { Self::Fail }
   }
}

#[derive(
   Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
pub enum VideoFps {
   #[default]
   #[serde(rename = "30")]
   #[strum(serialize = "30")]
   Fps30,
   #[serde(rename = "60")]
   #[strum(serialize = "60")]
   Fps60,
}

#[derive(
   Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
pub enum VideoResolution {
   #[default]
   #[serde(rename = "480p")]
   #[strum(serialize = "480p")]
   Sd480p,
   #[serde(rename = "720p")]
   #[strum(serialize = "720p")]
   Hd720p,
   #[serde(rename = "1080p")]
   #[strum(serialize = "1080p")]
   FullHd1080p,
}

impl VideoResolution {
   pub const fn dimensions(self) -> (u32, u32) {
      match self {
         Self::Sd480p => (800, 480),
         Self::Hd720p => (1280, 720),
         Self::FullHd1080p => (1920, 1080),
      }
   }
}

/// Hardware key codes the head unit can bind.
#[repr(u32)]
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   Hash,
   Serialize,
   Deserialize,
   strum::FromRepr,
   strum::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum ButtonCode {
   Microphone = 0x54,
   Menu = 0x52,
   Home = 0x03,
   Back = 0x04,
   Phone = 0x05,
   CallEnd = 0x06,
   Up = 0x13,
   Down = 0x14,
   Left = 0x15,
   Right = 0x16,
   Enter = 0x17,
   TogglePlay = 0x55,
   Next = 0x57,
   Previous = 0x58,
   Play = 0x7E,
   Pause = 0x7F,
   ScrollWheel = 0x10000,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AvStreamType {
   Audio,
   Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AudioType {
   Speech,
   System,
   Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum VideoFocusMode {
   Focused,
   Unfocused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum VideoFocusReason {
   None,
   Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AudioFocusType {
   Gain,
   GainTransient,
   GainNavi,
   Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AudioFocusState {
   Gain,
   GainTransient,
   Loss,
}

impl AudioFocusType {
   /// The head unit never competes for audio focus, so every request is granted.
   pub const fn granted_state(self) -> AudioFocusState {
      match self {
         Self::Gain => AudioFocusState::Gain,
         Self::GainTransient | Self::GainNavi => AudioFocusState::GainTransient,
         Self::Release => AudioFocusState::Loss,
      }
   }
}

// === Shared channel messages ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOpenRequest {
   pub priority: i32,
   pub channel_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOpenResponse {
   pub status: Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvChannelSetupRequest {
   pub config_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvChannelSetupResponse {
   pub media_status: Status,
   pub max_unacked: u32,
   pub configs: Vec<u32>,
}

impl AvChannelSetupResponse {
   /// The only configuration a head unit offers: index 0, one frame in flight.
   pub fn single_config(media_status: Status) -> Self {
      Self {
         media_status,
         max_unacked: 1,
         configs: vec![0],
      }
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvChannelStartIndication {
   pub session: SessionId,
   pub config: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvChannelStopIndication;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvMediaAckIndication {
   pub session: SessionId,
   pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvMediaIndication {
   pub timestamp: Option<Timestamp>,
   pub data: Vec<u8>,
}

// === Video ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFocusRequest {
   pub display_index: i32,
   pub focus_mode: VideoFocusMode,
   pub focus_reason: VideoFocusReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFocusIndication {
   pub focus_mode: VideoFocusMode,
   pub unrequested: bool,
}

impl VideoFocusIndication {
   pub const GRANTED: Self = Self {
      focus_mode: VideoFocusMode::Focused,
      unrequested: false,
   };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoInbound {
   OpenRequest(ChannelOpenRequest),
   SetupRequest(AvChannelSetupRequest),
   StartIndication(AvChannelStartIndication),
   StopIndication(AvChannelStopIndication),
   Media(AvMediaIndication),
   FocusRequest(VideoFocusRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoOutbound {
   OpenResponse(ChannelOpenResponse),
   SetupResponse(AvChannelSetupResponse),
   MediaAck(AvMediaAckIndication),
   FocusIndication(VideoFocusIndication),
}

// === Audio output ===

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioInbound {
   OpenRequest(ChannelOpenRequest),
   SetupRequest(AvChannelSetupRequest),
   StartIndication(AvChannelStartIndication),
   StopIndication(AvChannelStopIndication),
   Media(AvMediaIndication),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioOutbound {
   OpenResponse(ChannelOpenResponse),
   SetupResponse(AvChannelSetupResponse),
   MediaAck(AvMediaAckIndication),
}

// === Audio input ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvInputOpenRequest {
   pub open: bool,
   pub anc: bool,
   pub ec: bool,
   pub max_unacked: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvInputOpenResponse {
   pub session: SessionId,
   pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvInputInbound {
   OpenRequest(ChannelOpenRequest),
   SetupRequest(AvChannelSetupRequest),
   InputOpenRequest(AvInputOpenRequest),
   MediaAck(AvMediaAckIndication),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvInputOutbound {
   OpenResponse(ChannelOpenResponse),
   SetupResponse(AvChannelSetupResponse),
   InputOpenResponse(AvInputOpenResponse),
   Media { timestamp: Timestamp, data: Vec<u8> },
}

// === Input ===

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRequest {
   pub scan_codes: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingResponse {
   pub status: Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TouchAction {
   Press,
   Release,
   Drag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
   pub x: u32,
   pub y: u32,
   pub pointer_id: u32,
   pub action: TouchAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
   pub code: ButtonCode,
   pub pressed: bool,
   /// Relative movement, only meaningful for the scroll wheel.
   pub delta: i32,
}

/// Event raised by an input driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
   Touch(TouchEvent),
   Button(ButtonEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEventIndication {
   pub timestamp: Timestamp,
   pub event: InputEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputInbound {
   OpenRequest(ChannelOpenRequest),
   BindingRequest(BindingRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOutbound {
   OpenResponse(ChannelOpenResponse),
   BindingResponse(BindingResponse),
   Event(InputEventIndication),
}

// === Bluetooth ===

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BluetoothPairingRequest {
   pub phone_address: SmolStr,
   pub pairing_method: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BluetoothPairingResponse {
   pub already_paired: bool,
   pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BluetoothInbound {
   OpenRequest(ChannelOpenRequest),
   PairingRequest(BluetoothPairingRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BluetoothOutbound {
   OpenResponse(ChannelOpenResponse),
   PairingResponse(BluetoothPairingResponse),
}

// === Control ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRequest {
   pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingResponse {
   pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ShutdownReason {
   None,
   Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlInbound {
   ServiceDiscoveryRequest { device_name: SmolStr },
   PingRequest(PingRequest),
   PingResponse(PingResponse),
   AudioFocusRequest(AudioFocusType),
   NavigationFocusRequest(u32),
   ShutdownRequest(ShutdownReason),
   ShutdownResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutbound {
   ServiceDiscoveryResponse(ServiceDiscoveryResponse),
   PingRequest(PingRequest),
   PingResponse(PingResponse),
   AudioFocusResponse(AudioFocusState),
   NavigationFocusResponse(u32),
   ShutdownRequest(ShutdownReason),
   ShutdownResponse,
}

// === Capability advertisement ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConfigEntry {
   pub resolution: VideoResolution,
   pub fps: VideoFps,
   pub margin_width: u32,
   pub margin_height: u32,
   pub dpi: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfigEntry {
   pub sample_rate: u32,
   pub bit_depth: u32,
   pub channel_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelDescriptorKind {
   AvOutput {
      stream_type: AvStreamType,
      audio_type: Option<AudioType>,
      available_while_in_call: bool,
      video_configs: Vec<VideoConfigEntry>,
      audio_configs: Vec<AudioConfigEntry>,
   },
   AvInput {
      stream_type: AvStreamType,
      audio_config: AudioConfigEntry,
   },
   Input {
      supported_keycodes: Vec<u32>,
      touch_screen: Option<(u32, u32)>,
   },
   Bluetooth {
      adapter_address: SmolStr,
   },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
   pub channel_id: ChannelId,
   pub kind: ChannelDescriptorKind,
}

/// Capability advertisement sent in answer to a service discovery request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceDiscoveryResponse {
   pub head_unit_name: SmolStr,
   pub car_model: SmolStr,
   pub car_year: SmolStr,
   pub car_serial: SmolStr,
   pub left_hand_drive: bool,
   pub manufacturer: SmolStr,
   pub model: SmolStr,
   pub sw_build: SmolStr,
   pub sw_version: SmolStr,
   pub can_play_native_media_during_vr: bool,
   pub hide_clock: bool,
   pub channels: Vec<ChannelDescriptor>,
}

impl ServiceDiscoveryResponse {
   pub fn add_channel(&mut self, channel_id: ChannelId, kind: ChannelDescriptorKind) {
      self.channels.push(ChannelDescriptor { channel_id, kind });
   }

   pub fn channel(&self, channel_id: ChannelId) -> Option<&ChannelDescriptor> {
      self.channels.iter().find(|c| c.channel_id == channel_id)
   }
}
