//! Command serialization substrate
//!
//! Every state mutation in the service is a [`Command`] posted to the
//! single engine task; exactly one command executes at a time, which gives
//! single-writer discipline without a global mutex. Commands carry an
//! enqueue policy:
//!
//! - `Replace`: collapse to the most recent payload for the same key
//! - `Coalesce`: at most one queued instance for the same key
//! - `Append`: preserve full order and multiplicity
//!
//! Delayed commands are keyed; pushing a delayed command whose key is
//! already scheduled cancels and rearms the existing one, so each guard or
//! client has at most one outstanding timer.

use audiod_common::types::{
    AudioMode, AudioStream, ClientId, DeviceType, DeviceVolumeBehavior, RingerMode, StreamSet,
    VolumeDirection, VolumeFlags, ZenMode, ZenPolicy,
};
use std::collections::VecDeque;
use std::time::Instant;

/// How a command merges with already-queued commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueuePolicy {
    Replace,
    Coalesce,
    Append,
}

/// Identity used by Replace/Coalesce merging and delayed-command rearming
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKey {
    StreamVolume(AudioStream, DeviceType),
    StreamMute(AudioStream),
    GroupVolume(String, DeviceType),
    ZenMode,
    ZenPolicy,
    RingerAffected,
    DeviceBehavior(DeviceType),
    ActiveDevice,
    CallPath,
    SafeVolumeCheck,
    VerifyMode(ClientId),
    PersistVolume(AudioStream, DeviceType),
    PersistGroupVolume(String, DeviceType),
    NativeRestart,
    RetryApply(AudioStream, DeviceType),
}

/// Mutating commands executed by the engine task
#[derive(Debug, Clone)]
pub enum Command {
    SetStreamVolume {
        stream: AudioStream,
        device: DeviceType,
        /// Fixed-point x10 index
        index: i32,
        privileged: bool,
        flags: VolumeFlags,
    },
    AdjustStreamVolume {
        stream: AudioStream,
        device: DeviceType,
        direction: VolumeDirection,
        privileged: bool,
        flags: VolumeFlags,
    },
    SetStreamMute {
        stream: AudioStream,
        muted: bool,
    },
    SetGroupVolume {
        group: String,
        device: DeviceType,
        /// Fixed-point x10 index
        index: i32,
    },
    SetRingerMode {
        mode: RingerMode,
        external: bool,
    },
    SetZenMode {
        zen: ZenMode,
    },
    SetZenPolicy {
        policy: ZenPolicy,
    },
    /// Wholesale policy-delegate override of the ringer-affected set;
    /// `None` restores the platform default
    SetRingerAffectedStreams {
        streams: Option<StreamSet>,
    },
    SetMode {
        client: ClientId,
        mode: AudioMode,
        privileged: bool,
    },
    SetClientActivity {
        client: ClientId,
        playback: bool,
        recording: bool,
    },
    /// Delayed grace-window re-check of an unprivileged mode request
    VerifyModeClient {
        client: ClientId,
    },
    ClientDisconnected {
        client: ClientId,
    },
    SetDeviceVolumeBehavior {
        device: DeviceType,
        behavior: DeviceVolumeBehavior,
    },
    SetActiveDevice {
        device: DeviceType,
    },
    SetCallPathActive {
        active: bool,
    },
    SetSafeVolumeEnabled {
        enabled: bool,
    },
    /// Delayed periodic safe-volume listening check
    SafeVolumeCheck,
    /// Debounced persistence of one stream/device index
    PersistStreamVolume {
        stream: AudioStream,
        device: DeviceType,
    },
    PersistGroupVolume {
        group: String,
        device: DeviceType,
    },
    PersistRingerMode,
    PersistSafeVolumeState,
    /// Native engine restarted; replay ranges, indices, mutes and mode
    NativeRestarted,
    /// Delayed retry of a failed native apply
    RetryNativeApply {
        stream: AudioStream,
        device: DeviceType,
    },
    Shutdown,
}

impl Command {
    pub fn policy(&self) -> EnqueuePolicy {
        match self {
            Command::SetStreamVolume { .. }
            | Command::SetStreamMute { .. }
            | Command::SetGroupVolume { .. }
            | Command::SetZenMode { .. }
            | Command::SetZenPolicy { .. }
            | Command::SetRingerAffectedStreams { .. }
            | Command::SetDeviceVolumeBehavior { .. }
            | Command::SetActiveDevice { .. }
            | Command::SetCallPathActive { .. } => EnqueuePolicy::Replace,

            Command::SafeVolumeCheck
            | Command::VerifyModeClient { .. }
            | Command::NativeRestarted
            | Command::RetryNativeApply { .. } => EnqueuePolicy::Coalesce,

            // Relative adjustments, mode requests, ringer changes and
            // persistence writes must keep order and multiplicity.
            _ => EnqueuePolicy::Append,
        }
    }

    /// Merge key; `None` means the command never merges
    pub fn key(&self) -> Option<CommandKey> {
        match self {
            Command::SetStreamVolume { stream, device, .. } => {
                Some(CommandKey::StreamVolume(*stream, *device))
            }
            Command::SetStreamMute { stream, .. } => Some(CommandKey::StreamMute(*stream)),
            Command::SetGroupVolume { group, device, .. } => {
                Some(CommandKey::GroupVolume(group.clone(), *device))
            }
            Command::SetZenMode { .. } => Some(CommandKey::ZenMode),
            Command::SetZenPolicy { .. } => Some(CommandKey::ZenPolicy),
            Command::SetRingerAffectedStreams { .. } => Some(CommandKey::RingerAffected),
            Command::SetDeviceVolumeBehavior { device, .. } => {
                Some(CommandKey::DeviceBehavior(*device))
            }
            Command::SetActiveDevice { .. } => Some(CommandKey::ActiveDevice),
            Command::SetCallPathActive { .. } => Some(CommandKey::CallPath),
            Command::SafeVolumeCheck => Some(CommandKey::SafeVolumeCheck),
            Command::VerifyModeClient { client } => Some(CommandKey::VerifyMode(*client)),
            Command::PersistStreamVolume { stream, device } => {
                Some(CommandKey::PersistVolume(*stream, *device))
            }
            Command::PersistGroupVolume { group, device } => {
                Some(CommandKey::PersistGroupVolume(group.clone(), *device))
            }
            Command::NativeRestarted => Some(CommandKey::NativeRestart),
            Command::RetryNativeApply { stream, device } => {
                Some(CommandKey::RetryApply(*stream, *device))
            }
            _ => None,
        }
    }
}

/// Pending and delayed command storage for the engine task
///
/// Pure data structure; the engine run loop drives it from a tokio task.
pub struct CommandQueue {
    pending: VecDeque<Command>,
    /// Sorted by due instant, earliest first
    delayed: Vec<(Instant, Command)>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            delayed: Vec::new(),
        }
    }

    /// Enqueue an immediate command, applying its merge policy
    pub fn push(&mut self, cmd: Command) {
        match (cmd.policy(), cmd.key()) {
            (EnqueuePolicy::Replace, Some(key)) => {
                if let Some(pos) = self
                    .pending
                    .iter()
                    .position(|c| c.key().as_ref() == Some(&key))
                {
                    self.pending[pos] = cmd;
                } else {
                    self.pending.push_back(cmd);
                }
            }
            (EnqueuePolicy::Coalesce, Some(key)) => {
                if !self
                    .pending
                    .iter()
                    .any(|c| c.key().as_ref() == Some(&key))
                {
                    self.pending.push_back(cmd);
                }
            }
            _ => self.pending.push_back(cmd),
        }
    }

    /// Schedule a command for later; an already-scheduled command with the
    /// same key is cancelled and rearmed
    pub fn push_delayed(&mut self, cmd: Command, due: Instant) {
        if let Some(key) = cmd.key() {
            self.delayed.retain(|(_, c)| c.key().as_ref() != Some(&key));
        }
        let pos = self
            .delayed
            .iter()
            .position(|(d, _)| *d > due)
            .unwrap_or(self.delayed.len());
        self.delayed.insert(pos, (due, cmd));
    }

    /// Cancel a scheduled delayed command; returns whether one existed
    pub fn cancel_delayed(&mut self, key: &CommandKey) -> bool {
        let before = self.delayed.len();
        self.delayed.retain(|(_, c)| c.key().as_ref() != Some(key));
        self.delayed.len() != before
    }

    /// Earliest delayed deadline, if any
    pub fn next_due(&self) -> Option<Instant> {
        self.delayed.first().map(|(due, _)| *due)
    }

    /// Move all due delayed commands into the pending queue
    pub fn promote_due(&mut self, now: Instant) {
        while self
            .delayed
            .first()
            .map(|(due, _)| *due <= now)
            .unwrap_or(false)
        {
            let (_, cmd) = self.delayed.remove(0);
            self.push(cmd);
        }
    }

    /// Move every delayed command into the pending queue (shutdown flush)
    pub fn promote_all(&mut self) {
        for (_, cmd) in std::mem::take(&mut self.delayed) {
            self.push(cmd);
        }
    }

    pub fn pop(&mut self) -> Option<Command> {
        self.pending.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn delayed_len(&self) -> usize {
        self.delayed.len()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}
