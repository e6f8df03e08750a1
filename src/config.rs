//! Configuration management for the head unit.
//!
//! The configuration is read once at startup and handed around as an
//! immutable `Arc<Config>` snapshot. Sessions built from a snapshot never
//! observe later edits.

use std::{
   env, fs,
   path::{Path, PathBuf},
   time::Duration,
};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{
   error::{AutoAppError, Result},
   protocol::{ButtonCode, VideoFps, VideoResolution},
};

/// Main configuration structure.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
   #[serde(default)]
   pub general: GeneralConfig,

   #[serde(default)]
   pub video: VideoConfig,

   #[serde(default)]
   pub input: InputConfig,

   #[serde(default)]
   pub bluetooth: BluetoothConfig,

   #[serde(default)]
   pub audio: AudioConfig,

   #[serde(default)]
   pub head_unit: HeadUnitInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrafficHandedness {
   #[default]
   LeftHandDrive,
   RightHandDrive,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeneralConfig {
   #[serde(default)]
   pub handedness: TrafficHandedness,

   #[serde(default = "default_true")]
   pub show_clock: bool,

   /// Interval between heartbeats sent to the phone, in milliseconds.
   #[serde(default = "default_ping_interval")]
   pub ping_interval_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VideoConfig {
   #[serde(default)]
   pub fps: VideoFps,

   #[serde(default)]
   pub resolution: VideoResolution,

   #[serde(default = "default_dpi")]
   pub screen_dpi: u32,

   #[serde(default = "default_omx_layer")]
   pub omx_layer_index: i32,

   #[serde(default)]
   pub margin_width: u32,

   #[serde(default)]
   pub margin_height: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InputConfig {
   #[serde(default = "default_true")]
   pub touchscreen_enabled: bool,

   #[serde(default = "default_button_codes")]
   pub button_codes: Vec<ButtonCode>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BluetoothAdapterMode {
   #[default]
   Disabled,
   Local,
   Remote,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct BluetoothConfig {
   #[serde(default)]
   pub adapter: BluetoothAdapterMode,

   /// Adapter address advertised when `adapter = "remote"`.
   #[serde(default)]
   pub remote_address: SmolStr,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioBackend {
   #[default]
   Rtaudio,
   Qt,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AudioConfig {
   #[serde(default = "default_true")]
   pub music_channel_enabled: bool,

   #[serde(default = "default_true")]
   pub speech_channel_enabled: bool,

   #[serde(default)]
   pub output_backend: AudioBackend,
}

/// Identity strings reported to the phone during service discovery.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HeadUnitInfo {
   #[serde(default = "default_head_unit_name")]
   pub name: SmolStr,
   #[serde(default = "default_car_model")]
   pub car_model: SmolStr,
   #[serde(default = "default_car_year")]
   pub car_year: SmolStr,
   #[serde(default = "default_car_serial")]
   pub car_serial: SmolStr,
   #[serde(default = "default_manufacturer")]
   pub manufacturer: SmolStr,
   #[serde(default = "default_head_unit_model")]
   pub model: SmolStr,
   #[serde(default = "default_sw_build")]
   pub sw_build: SmolStr,
   #[serde(default = "default_sw_version")]
   pub sw_version: SmolStr,
}

const fn default_true() -> bool {
   true
}

const fn default_ping_interval() -> u64 {
   5000
}

const fn default_dpi() -> u32 {
   140
}

const fn default_omx_layer() -> i32 {
   2
}

fn default_button_codes() -> Vec<ButtonCode> {
   vec![
      ButtonCode::Play,
      ButtonCode::Pause,
      ButtonCode::TogglePlay,
      ButtonCode::Next,
      ButtonCode::Previous,
      ButtonCode::Home,
      ButtonCode::Phone,
      ButtonCode::CallEnd,
      ButtonCode::Microphone,
      ButtonCode::Left,
      ButtonCode::Right,
      ButtonCode::Up,
      ButtonCode::Down,
      ButtonCode::ScrollWheel,
      ButtonCode::Back,
      ButtonCode::Enter,
   ]
}

fn default_head_unit_name() -> SmolStr {
   SmolStr::new_static("OpenAuto")
}

fn default_car_model() -> SmolStr {
   SmolStr::new_static("Universal")
}

fn default_car_year() -> SmolStr {
   SmolStr::new_static("2018")
}

fn default_car_serial() -> SmolStr {
   SmolStr::new_static("20180301")
}

fn default_manufacturer() -> SmolStr {
   SmolStr::new_static("f1x")
}

fn default_head_unit_model() -> SmolStr {
   SmolStr::new_static("OpenAuto Autoapp")
}

fn default_sw_build() -> SmolStr {
   SmolStr::new_static("1")
}

fn default_sw_version() -> SmolStr {
   SmolStr::new_static("1.0")
}

impl Default for GeneralConfig {
   fn default() -> Self {
      Self {
         handedness: TrafficHandedness::default(),
         show_clock: true,
         ping_interval_ms: default_ping_interval(),
      }
   }
}

impl Default for VideoConfig {
   fn default() -> Self {
      Self {
         fps: VideoFps::default(),
         resolution: VideoResolution::default(),
         screen_dpi: default_dpi(),
         omx_layer_index: default_omx_layer(),
         margin_width: 0,
         margin_height: 0,
      }
   }
}

impl Default for InputConfig {
   fn default() -> Self {
      Self {
         touchscreen_enabled: true,
         button_codes: default_button_codes(),
      }
   }
}

impl Default for AudioConfig {
   fn default() -> Self {
      Self {
         music_channel_enabled: true,
         speech_channel_enabled: true,
         output_backend: AudioBackend::default(),
      }
   }
}

impl Default for HeadUnitInfo {
   fn default() -> Self {
      Self {
         name: default_head_unit_name(),
         car_model: default_car_model(),
         car_year: default_car_year(),
         car_serial: default_car_serial(),
         manufacturer: default_manufacturer(),
         model: default_head_unit_model(),
         sw_build: default_sw_build(),
         sw_version: default_sw_version(),
      }
   }
}

impl Default for Config {
   fn default() -> Self {
      Self {
         general: GeneralConfig::default(),
         video: VideoConfig::default(),
         input: InputConfig::default(),
         bluetooth: BluetoothConfig::default(),
         audio: AudioConfig::default(),
         head_unit: HeadUnitInfo::default(),
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      Self::load_from(&Self::config_path()?)
   }

   /// Saves the current configuration to disk.
   pub fn save(&self) -> Result<()> {
      self.save_to(&Self::config_path()?)
   }

   pub fn load_from(path: &Path) -> Result<Self> {
      if path.exists() {
         let contents = fs::read_to_string(path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         let config = Self::default();
         config.save_to(path)?;
         Ok(config)
      }
   }

   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      if let Ok(autoapp_home) = env::var("AUTOAPP_HOME") {
         return Ok(PathBuf::from(autoapp_home).join("config.toml"));
      }

      let config_dir = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else if let Ok(home) = env::var("HOME") {
         PathBuf::from(home).join(".config")
      } else {
         return Err(AutoAppError::ConfigDirNotFound);
      };

      Ok(config_dir.join("autoapp").join("config.toml"))
   }

   /// Heartbeat period, which is also the deadline a heartbeat has to be answered in.
   pub const fn ping_interval(&self) -> Duration {
      Duration::from_millis(self.general.ping_interval_ms)
   }
}
