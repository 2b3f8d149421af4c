//! Safe media volume guard
//!
//! Four-state machine capping media volume on risky output devices
//! (wired/USB headsets) once a cumulative listening budget is exceeded:
//!
//! ```text
//! NotConfigured --first regional config--> Disabled | Active
//! Active --user disable / confirmed listening--> Inactive
//! Inactive --listening budget exceeded--> Active
//! ```
//!
//! While Active, media writes to risky devices are capped at the device's
//! safe index; an over-cap request is deferred (stored, warning emitted)
//! and resolved only by an explicit disable or a later under-cap request.
//! Only {NotConfigured, Disabled, Active} are persisted; Inactive is
//! re-derived at startup from a nonzero listening counter.

use crate::native::AudioBackend;
use audiod_common::config::{StreamRange, SAFE_USB_TARGET_DB, UNSAFE_LISTENING_BUDGET_MS};
use audiod_common::types::{AudioStream, DeviceType, VolumeFlags};
use tracing::{debug, info, warn};

/// Guard state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    NotConfigured,
    Disabled,
    Inactive,
    Active,
}

impl GuardState {
    /// Integer form for the settings table; Inactive collapses to Active
    pub fn as_setting(&self) -> i64 {
        match self {
            GuardState::NotConfigured => 0,
            GuardState::Disabled => 1,
            // Inactive is never persisted
            GuardState::Inactive | GuardState::Active => 3,
        }
    }
}

/// A deferred over-cap volume request
#[derive(Debug, Clone, PartialEq)]
pub struct PendingVolumeRequest {
    pub stream: AudioStream,
    pub device: DeviceType,
    /// The requested (uncapped) x10 index
    pub index: i32,
    pub flags: VolumeFlags,
}

/// Outcome of checking one media write against the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeVolumeDecision {
    Allow,
    /// Store at most `capped`; the original request is deferred
    Cap { capped: i32 },
}

pub struct SafeVolumeGuard {
    state: GuardState,
    /// Cumulative listening time above the cap on risky devices
    music_active_ms: u64,
    pending: Option<PendingVolumeRequest>,
    /// Regional config cache key; a change re-runs the initial transition
    config_key: Option<String>,
    /// Safe media index for risky devices generally (x10)
    safe_media_index: i32,
    /// Derived safe index for USB headsets (x10)
    safe_usb_index: Option<i32>,
}

impl SafeVolumeGuard {
    pub fn new(safe_media_index: i32) -> Self {
        Self {
            state: GuardState::NotConfigured,
            music_active_ms: 0,
            pending: None,
            config_key: None,
            safe_media_index,
            safe_usb_index: None,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == GuardState::Active
    }

    pub fn music_active_ms(&self) -> u64 {
        self.music_active_ms
    }

    /// Restore persisted state; Inactive is re-derived from a nonzero
    /// listening counter.
    pub fn restore(&mut self, persisted: i64, music_active_ms: u64) {
        self.music_active_ms = music_active_ms;
        self.state = match persisted {
            1 => GuardState::Disabled,
            3 => {
                if music_active_ms > 0 && music_active_ms < UNSAFE_LISTENING_BUDGET_MS {
                    GuardState::Inactive
                } else {
                    GuardState::Active
                }
            }
            _ => GuardState::NotConfigured,
        };
        debug!(state = ?self.state, music_active_ms, "safe volume guard restored");
    }

    /// First (or changed) regional config read; returns whether the state
    /// changed. Self-transitions are idempotent.
    pub fn on_regional_config(&mut self, enforced: bool, key: String) -> bool {
        if self.config_key.as_deref() == Some(key.as_str())
            && self.state != GuardState::NotConfigured
        {
            return false;
        }
        self.config_key = Some(key);
        let new_state = if enforced {
            match self.state {
                // Preserve a user disable / confirmation across a config
                // refresh with the same outcome
                GuardState::Inactive => GuardState::Inactive,
                _ => GuardState::Active,
            }
        } else {
            GuardState::Disabled
        };
        let changed = new_state != self.state;
        if changed {
            info!(old = ?self.state, new = ?new_state, "safe volume guard configured");
            self.state = new_state;
        }
        changed
    }

    /// Check a media write against the cap
    pub fn check(&self, index: i32, device: DeviceType, device_risky: bool) -> SafeVolumeDecision {
        if self.state != GuardState::Active || !device_risky {
            return SafeVolumeDecision::Allow;
        }
        let cap = self.safe_index(device);
        if index <= cap {
            SafeVolumeDecision::Allow
        } else {
            SafeVolumeDecision::Cap { capped: cap }
        }
    }

    /// Safe index for a risky device (x10 units)
    pub fn safe_index(&self, device: DeviceType) -> i32 {
        if device == DeviceType::UsbHeadset {
            self.safe_usb_index.unwrap_or(self.safe_media_index)
        } else {
            self.safe_media_index
        }
    }

    /// Derive the USB headset safe index: the largest UI index whose
    /// output level does not exceed the target dBFS, found by binary
    /// search over the backend's volume curve.
    pub fn derive_usb_safe_index(&mut self, backend: &dyn AudioBackend, music_range: &StreamRange) {
        let min_ui = music_range.min / 10;
        let max_ui = music_range.max / 10;
        let mut lo = min_ui;
        let mut hi = max_ui;
        while lo < hi {
            let mid = (lo + hi + 1) / 2;
            let db = backend.stream_volume_db(AudioStream::Music, mid, DeviceType::UsbHeadset);
            if db <= SAFE_USB_TARGET_DB {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        self.safe_usb_index = Some(lo * 10);
        debug!(safe_usb_index = lo * 10, "derived USB safe index");
    }

    /// One periodic listening check; `elapsed_ms` has passed with media
    /// playing above the cap on a risky device iff `above_cap`. Returns
    /// true when the budget was just exceeded and the guard re-armed.
    pub fn note_music_activity(&mut self, elapsed_ms: u64, above_cap: bool) -> bool {
        if self.state != GuardState::Inactive || !above_cap {
            return false;
        }
        self.music_active_ms = self.music_active_ms.saturating_add(elapsed_ms);
        if self.music_active_ms >= UNSAFE_LISTENING_BUDGET_MS {
            warn!(
                music_active_ms = self.music_active_ms,
                "listening budget exceeded, re-arming safe volume cap"
            );
            self.state = GuardState::Active;
            self.music_active_ms = 0;
            return true;
        }
        false
    }

    /// Explicit user disable (or post-warning confirmation): deactivates
    /// enforcement, resets the listening counter and releases any pending
    /// request for replay.
    pub fn disable_enforcement(&mut self) -> Option<PendingVolumeRequest> {
        if self.state == GuardState::Active || self.state == GuardState::Inactive {
            self.state = GuardState::Inactive;
            self.music_active_ms = 0;
        }
        self.pending.take()
    }

    /// Explicit (re-)enable; idempotent
    pub fn enable_enforcement(&mut self) -> bool {
        if self.state == GuardState::Active {
            return false;
        }
        self.state = GuardState::Active;
        self.pending = None;
        true
    }

    /// Defer an over-cap request; last-write-wins over any stale one
    pub fn set_pending(&mut self, pending: PendingVolumeRequest) {
        self.pending = Some(pending);
    }

    /// Any under-cap request supersedes a stale pending one
    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    pub fn pending(&self) -> Option<&PendingVolumeRequest> {
        self.pending.as_ref()
    }

    pub fn take_pending(&mut self) -> Option<PendingVolumeRequest> {
        self.pending.take()
    }
}
