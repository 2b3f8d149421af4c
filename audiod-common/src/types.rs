//! Core enumerations for the volume and mode coordination service
//!
//! Logical streams, output devices, ringer/zen modes, audio modes, and the
//! small value types carried by commands and events. All enums serialize
//! as snake_case strings so they can appear in config files, settings keys
//! and serialized events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical audio stream category
///
/// Each stream has its own platform-configured volume range (fixed-point
/// x10 units) and may be aliased to another stream's stored volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioStream {
    VoiceCall,
    System,
    Ring,
    Music,
    Alarm,
    Notification,
    BluetoothSco,
    SystemEnforced,
    Dtmf,
    Tts,
    Accessibility,
    Assistant,
}

impl AudioStream {
    /// All streams, in stable order
    pub const ALL: [AudioStream; 12] = [
        AudioStream::VoiceCall,
        AudioStream::System,
        AudioStream::Ring,
        AudioStream::Music,
        AudioStream::Alarm,
        AudioStream::Notification,
        AudioStream::BluetoothSco,
        AudioStream::SystemEnforced,
        AudioStream::Dtmf,
        AudioStream::Tts,
        AudioStream::Accessibility,
        AudioStream::Assistant,
    ];

    /// Stable name used in settings keys and config files
    pub fn name(&self) -> &'static str {
        match self {
            AudioStream::VoiceCall => "voice_call",
            AudioStream::System => "system",
            AudioStream::Ring => "ring",
            AudioStream::Music => "music",
            AudioStream::Alarm => "alarm",
            AudioStream::Notification => "notification",
            AudioStream::BluetoothSco => "bluetooth_sco",
            AudioStream::SystemEnforced => "system_enforced",
            AudioStream::Dtmf => "dtmf",
            AudioStream::Tts => "tts",
            AudioStream::Accessibility => "accessibility",
            AudioStream::Assistant => "assistant",
        }
    }

    /// Bit position within a [`StreamSet`]
    pub fn bit(&self) -> u32 {
        1u32 << (*self as u32)
    }
}

impl std::fmt::Display for AudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Bitmask over [`AudioStream`] values
///
/// Used for the ringer-affected stream set and the internal-mute set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamSet(pub u32);

impl StreamSet {
    pub const EMPTY: StreamSet = StreamSet(0);

    pub fn of(streams: &[AudioStream]) -> Self {
        let mut set = StreamSet(0);
        for s in streams {
            set.insert(*s);
        }
        set
    }

    pub fn contains(&self, stream: AudioStream) -> bool {
        self.0 & stream.bit() != 0
    }

    pub fn insert(&mut self, stream: AudioStream) {
        self.0 |= stream.bit();
    }

    pub fn remove(&mut self, stream: AudioStream) {
        self.0 &= !stream.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = AudioStream> + '_ {
        AudioStream::ALL.iter().copied().filter(|s| self.contains(*s))
    }
}

/// Output device class known to the native engine
///
/// `Default` is the distinguished fallback entry that always exists in
/// every stream's device index map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Default,
    Speaker,
    Earpiece,
    WiredHeadset,
    WiredHeadphone,
    BluetoothA2dp,
    BluetoothSco,
    UsbHeadset,
    Hdmi,
    Dock,
}

impl DeviceType {
    pub const ALL: [DeviceType; 10] = [
        DeviceType::Default,
        DeviceType::Speaker,
        DeviceType::Earpiece,
        DeviceType::WiredHeadset,
        DeviceType::WiredHeadphone,
        DeviceType::BluetoothA2dp,
        DeviceType::BluetoothSco,
        DeviceType::UsbHeadset,
        DeviceType::Hdmi,
        DeviceType::Dock,
    ];

    /// Stable name used in settings keys
    pub fn name(&self) -> &'static str {
        match self {
            DeviceType::Default => "default",
            DeviceType::Speaker => "speaker",
            DeviceType::Earpiece => "earpiece",
            DeviceType::WiredHeadset => "wired_headset",
            DeviceType::WiredHeadphone => "wired_headphone",
            DeviceType::BluetoothA2dp => "bt_a2dp",
            DeviceType::BluetoothSco => "bt_sco",
            DeviceType::UsbHeadset => "usb_headset",
            DeviceType::Hdmi => "hdmi",
            DeviceType::Dock => "dock",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a device renders its stored volume index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceVolumeBehavior {
    /// Normal variable volume
    Variable,
    /// Index is forced to either 0 or the stream maximum
    Fixed,
    /// Always renders at maximum regardless of the stored index
    Full,
}

/// System ringer mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RingerMode {
    Silent,
    Vibrate,
    Normal,
}

impl RingerMode {
    /// Decode the persisted integer form; unknown values map to None
    pub fn from_setting(value: i64) -> Option<RingerMode> {
        match value {
            0 => Some(RingerMode::Silent),
            1 => Some(RingerMode::Vibrate),
            2 => Some(RingerMode::Normal),
            _ => None,
        }
    }

    /// Integer form used in the settings table
    pub fn as_setting(&self) -> i64 {
        match self {
            RingerMode::Silent => 0,
            RingerMode::Vibrate => 1,
            RingerMode::Normal => 2,
        }
    }

    /// True when this mode mutes ringer-affected streams
    pub fn mutes_ringer_streams(&self) -> bool {
        !matches!(self, RingerMode::Normal)
    }
}

/// System-wide audio mode requested by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    Normal,
    Ringtone,
    InCall,
    InCommunication,
    CallScreening,
}

/// Interruption filter (zen) level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZenMode {
    Off,
    /// Priority-only; consults the per-category [`ZenPolicy`]
    ImportantInterruptions,
    NoInterruptions,
    /// Alarms (and media) only
    Alarms,
}

/// Per-category policy applied at [`ZenMode::ImportantInterruptions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ZenPolicy {
    pub mute_alarms: bool,
    pub mute_media: bool,
    pub mute_system: bool,
    pub mute_notification_and_ring: bool,
}

/// Direction argument for relative volume adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeDirection {
    Lower,
    Raise,
    Same,
    Mute,
    Unmute,
    ToggleMute,
}

/// UI-facing flags attached to change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeFlags {
    /// Show the volume UI for this change
    pub show_ui: bool,
    /// Show the hearing-safety warning dialog
    pub show_safe_warning: bool,
    /// Show the "media is silent or device will vibrate" hint
    pub show_silent_hint: bool,
}

/// Identity of a client connection
///
/// The token is assigned by the transport layer on connect and is the key
/// used by the liveness watch; the pid is carried for logging and mode
/// ownership reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId {
    pub pid: i32,
    pub token: Uuid,
}

impl ClientId {
    pub fn new(pid: i32) -> Self {
        Self {
            pid,
            token: Uuid::new_v4(),
        }
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pid {} ({})", self.pid, self.token)
    }
}
