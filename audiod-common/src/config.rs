//! Platform volume configuration
//!
//! Immutable tables describing every logical stream's volume range, the
//! active alias table, the default ringer-affected stream set, and the
//! device classes subject to hearing-safety capping. Loaded once at
//! startup (built-in defaults, optionally overridden from a TOML file) and
//! replaced wholesale when revised; consumers hold an `Arc` and never
//! mutate in place.

use crate::error::{Error, Result};
use crate::types::{AudioStream, DeviceType, StreamSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One UI volume step in fixed-point x10 index units
pub const VOLUME_STEP: i32 = 10;

/// Cumulative risky-listening budget before the safe volume guard arms
pub const UNSAFE_LISTENING_BUDGET_MS: u64 = 20 * 3600 * 1000;

/// Poll interval for the safe volume guard while media is active
pub const SAFE_VOLUME_CHECK_INTERVAL_MS: u64 = 60_000;

/// Target output level for USB headset safe-index derivation (dBFS)
pub const SAFE_USB_TARGET_DB: f32 = -37.0;

/// Grace window for unprivileged in-communication mode requests
pub const MODE_VERIFY_GRACE_MS: u64 = 6_000;

/// Debounce applied to per-device volume persistence writes
pub const PERSIST_DEBOUNCE_MS: u64 = 500;

/// Fixed delay before retrying a failed native-engine apply
pub const NATIVE_RETRY_DELAY_MS: u64 = 1_000;

/// Convert a fixed-point x10 index to its UI value (rounded)
pub fn index_to_ui(index: i32) -> i32 {
    (index + 5) / 10
}

/// Convert a UI volume value to the fixed-point x10 index
pub fn ui_to_index(ui: i32) -> i32 {
    ui * 10
}

/// Volume range for one stream, in fixed-point x10 units
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StreamRange {
    pub min: i32,
    pub max: i32,
    /// Floor applied to unprivileged callers; `min` when absent
    #[serde(default)]
    pub min_unprivileged: Option<i32>,
    /// Index stored for the default device before any persisted value
    pub default: i32,
}

impl StreamRange {
    /// The effective lower clamp bound for a caller
    pub fn floor(&self, privileged: bool) -> i32 {
        if privileged {
            self.min
        } else {
            self.min_unprivileged.unwrap_or(self.min)
        }
    }
}

/// Immutable platform configuration tables
#[derive(Debug, Clone, Serialize)]
pub struct PlatformConfiguration {
    /// Per-stream volume ranges
    pub ranges: HashMap<AudioStream, StreamRange>,

    /// Active alias table (stream -> representative stream)
    pub aliases: HashMap<AudioStream, AudioStream>,

    /// Streams muted by vibrate/silent ringer modes by default
    pub ringer_affected: Vec<AudioStream>,

    /// Device classes subject to hearing-safety capping
    pub risky_devices: Vec<DeviceType>,

    /// Devices whose index snaps to {0, max}
    pub fixed_volume_devices: Vec<DeviceType>,

    /// Devices that always render at max
    pub full_volume_devices: Vec<DeviceType>,

    /// Safe media index for risky devices (x10 units)
    pub safe_media_index: i32,

    /// Whether the regional configuration mandates safe volume enforcement
    pub safe_volume_enforced: bool,

    /// Regulatory region code the enforcement flag came from
    pub region: String,

    /// Whether this device has a vibrator
    pub has_vibrator: bool,
}

/// Partial config file form, merged over the builtin tables
#[derive(Debug, Default, Deserialize)]
struct ConfigOverlay {
    #[serde(default)]
    ranges: HashMap<AudioStream, StreamRange>,
    #[serde(default)]
    aliases: HashMap<AudioStream, AudioStream>,
    ringer_affected: Option<Vec<AudioStream>>,
    risky_devices: Option<Vec<DeviceType>>,
    fixed_volume_devices: Option<Vec<DeviceType>>,
    full_volume_devices: Option<Vec<DeviceType>>,
    safe_media_index: Option<i32>,
    safe_volume_enforced: Option<bool>,
    region: Option<String>,
    has_vibrator: Option<bool>,
}

fn builtin_ranges() -> HashMap<AudioStream, StreamRange> {
    fn range(min: i32, max: i32, default: i32) -> StreamRange {
        StreamRange {
            min,
            max,
            min_unprivileged: None,
            default,
        }
    }
    let mut ranges = HashMap::new();
    ranges.insert(AudioStream::VoiceCall, range(10, 70, 40));
    ranges.insert(AudioStream::System, range(0, 70, 50));
    ranges.insert(AudioStream::Ring, range(0, 70, 50));
    ranges.insert(AudioStream::Music, range(0, 150, 50));
    ranges.insert(
        AudioStream::Alarm,
        StreamRange {
            min: 0,
            max: 70,
            min_unprivileged: Some(10),
            default: 60,
        },
    );
    ranges.insert(AudioStream::Notification, range(0, 70, 50));
    ranges.insert(AudioStream::BluetoothSco, range(0, 150, 70));
    ranges.insert(AudioStream::SystemEnforced, range(0, 70, 50));
    ranges.insert(AudioStream::Dtmf, range(0, 150, 60));
    ranges.insert(AudioStream::Tts, range(0, 150, 100));
    ranges.insert(
        AudioStream::Accessibility,
        StreamRange {
            min: 0,
            max: 150,
            min_unprivileged: Some(10),
            default: 100,
        },
    );
    ranges.insert(AudioStream::Assistant, range(0, 150, 100));
    ranges
}

fn builtin_aliases() -> HashMap<AudioStream, AudioStream> {
    let mut aliases = HashMap::new();
    aliases.insert(AudioStream::VoiceCall, AudioStream::VoiceCall);
    aliases.insert(AudioStream::System, AudioStream::Ring);
    aliases.insert(AudioStream::Ring, AudioStream::Ring);
    aliases.insert(AudioStream::Music, AudioStream::Music);
    aliases.insert(AudioStream::Alarm, AudioStream::Alarm);
    aliases.insert(AudioStream::Notification, AudioStream::Ring);
    aliases.insert(AudioStream::BluetoothSco, AudioStream::BluetoothSco);
    aliases.insert(AudioStream::SystemEnforced, AudioStream::Ring);
    aliases.insert(AudioStream::Dtmf, AudioStream::Ring);
    aliases.insert(AudioStream::Tts, AudioStream::Music);
    aliases.insert(AudioStream::Accessibility, AudioStream::Music);
    aliases.insert(AudioStream::Assistant, AudioStream::Music);
    aliases
}

impl Default for PlatformConfiguration {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PlatformConfiguration {
    /// Built-in defaults used when no config file is given
    pub fn builtin() -> Self {
        let config = Self {
            ranges: builtin_ranges(),
            aliases: builtin_aliases(),
            ringer_affected: vec![
                AudioStream::Ring,
                AudioStream::Notification,
                AudioStream::System,
            ],
            risky_devices: vec![
                DeviceType::WiredHeadset,
                DeviceType::WiredHeadphone,
                DeviceType::UsbHeadset,
            ],
            fixed_volume_devices: vec![DeviceType::Hdmi],
            full_volume_devices: vec![],
            safe_media_index: 100,
            safe_volume_enforced: true,
            region: "00".to_string(),
            has_vibrator: true,
        };
        debug_assert!(config.validate().is_ok());
        config
    }

    /// Load from a TOML file; omitted sections fall back to builtin tables
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse from TOML text, merging over the builtin tables
    pub fn from_toml(text: &str) -> Result<Self> {
        let overlay: ConfigOverlay = toml::from_str(text)
            .map_err(|e| Error::Config(format!("invalid platform config: {}", e)))?;

        let mut config = Self::builtin();
        for (stream, range) in overlay.ranges {
            config.ranges.insert(stream, range);
        }
        for (stream, alias) in overlay.aliases {
            config.aliases.insert(stream, alias);
        }
        if let Some(v) = overlay.ringer_affected {
            config.ringer_affected = v;
        }
        if let Some(v) = overlay.risky_devices {
            config.risky_devices = v;
        }
        if let Some(v) = overlay.fixed_volume_devices {
            config.fixed_volume_devices = v;
        }
        if let Some(v) = overlay.full_volume_devices {
            config.full_volume_devices = v;
        }
        if let Some(v) = overlay.safe_media_index {
            config.safe_media_index = v;
        }
        if let Some(v) = overlay.safe_volume_enforced {
            config.safe_volume_enforced = v;
        }
        if let Some(v) = overlay.region {
            config.region = v;
        }
        if let Some(v) = overlay.has_vibrator {
            config.has_vibrator = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the tables: every stream has a range and an alias entry,
    /// bounds are ordered, defaults in range, and the alias table is
    /// idempotent (which also rules out cycles).
    pub fn validate(&self) -> Result<()> {
        for stream in AudioStream::ALL {
            let range = self
                .ranges
                .get(&stream)
                .ok_or_else(|| Error::Config(format!("missing range for stream {}", stream)))?;
            if range.min > range.max {
                return Err(Error::Config(format!(
                    "stream {} has inverted range [{}, {}]",
                    stream, range.min, range.max
                )));
            }
            if let Some(floor) = range.min_unprivileged {
                if floor < range.min || floor > range.max {
                    return Err(Error::Config(format!(
                        "stream {} unprivileged floor {} outside [{}, {}]",
                        stream, floor, range.min, range.max
                    )));
                }
            }
            if range.default < range.min || range.default > range.max {
                return Err(Error::Config(format!(
                    "stream {} default {} outside [{}, {}]",
                    stream, range.default, range.min, range.max
                )));
            }
            let alias = self
                .aliases
                .get(&stream)
                .ok_or_else(|| Error::Config(format!("missing alias for stream {}", stream)))?;
            let canonical = self.aliases.get(alias).copied().unwrap_or(*alias);
            if canonical != *alias {
                return Err(Error::Config(format!(
                    "alias table not idempotent: {} -> {} -> {}",
                    stream, alias, canonical
                )));
            }
        }
        Ok(())
    }

    /// Representative stream for `stream` under the active alias table
    pub fn alias_of(&self, stream: AudioStream) -> AudioStream {
        self.aliases.get(&stream).copied().unwrap_or(stream)
    }

    /// All streams whose alias resolves to `target` (including itself)
    pub fn aliased_to(&self, target: AudioStream) -> Vec<AudioStream> {
        AudioStream::ALL
            .iter()
            .copied()
            .filter(|s| self.alias_of(*s) == target)
            .collect()
    }

    pub fn range(&self, stream: AudioStream) -> StreamRange {
        self.ranges[&stream]
    }

    pub fn ringer_affected_default(&self) -> StreamSet {
        StreamSet::of(&self.ringer_affected)
    }

    pub fn is_risky_device(&self, device: DeviceType) -> bool {
        self.risky_devices.contains(&device)
    }

    /// Return a copy with the DTMF alias retargeted, keeping everything
    /// else; the alias table is replaced wholesale.
    pub fn with_dtmf_alias(&self, target: AudioStream) -> Result<Self> {
        let mut config = self.clone();
        config.aliases.insert(AudioStream::Dtmf, target);
        config.validate()?;
        Ok(config)
    }
}
