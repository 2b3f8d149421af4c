//! Event types and bus for audiod change notifications
//!
//! The coordination engine broadcasts an [`AudioEvent`] whenever a
//! user-visible piece of state actually changes (volume on the routed
//! device, ringer mode, mode owner, ...). The transport layer subscribes
//! and forwards events to registered client observers.

use crate::types::{
    AudioMode, AudioStream, DeviceType, DeviceVolumeBehavior, RingerMode, VolumeFlags, ZenMode,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Change notifications emitted by the coordination engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AudioEvent {
    /// A stream's volume changed on its currently routed device
    VolumeChanged {
        stream: AudioStream,
        device: DeviceType,
        /// Previous index, x10 units
        old_index: i32,
        /// New index, x10 units
        new_index: i32,
        flags: VolumeFlags,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A volume group's index changed
    GroupVolumeChanged {
        group: String,
        device: DeviceType,
        index: i32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A stream's explicit mute state changed
    MuteChanged {
        stream: AudioStream,
        muted: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The system ringer mode changed
    RingerModeChanged {
        old_mode: RingerMode,
        new_mode: RingerMode,
        /// True when this is the externally visible mode, false for the
        /// internal mode
        external: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The interruption filter level changed
    ZenModeChanged {
        zen: ZenMode,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The resolved audio mode (and owner) changed
    ModeChanged {
        mode: AudioMode,
        /// Pid of the owning client, None when no owner (Normal)
        owner_pid: Option<i32>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Directive: route the ringer to the call audio path
    ///
    /// Emitted when a vibrate-capable ringer mode is entered while a
    /// call-path voice connection is active.
    RingerRouteToCall {
        enabled: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An over-cap media request was deferred by the safe volume guard;
    /// the UI should show the hearing-safety warning
    SafeVolumeWarning {
        stream: AudioStream,
        device: DeviceType,
        /// The requested (rejected) index, x10 units
        requested_index: i32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A device's volume behavior changed
    DeviceVolumeBehaviorChanged {
        device: DeviceType,
        behavior: DeviceVolumeBehavior,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast bus for [`AudioEvent`]
pub struct EventBus {
    tx: broadcast::Sender<AudioEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AudioEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: AudioEvent) {
        let _ = self.tx.send(event);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
