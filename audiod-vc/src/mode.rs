//! Audio mode ownership arbitration
//!
//! Tracks at most one mode request per live client and resolves them to
//! one effective system mode. Privileged entries always win; unprivileged
//! in-communication entries are only active while they actually play back
//! or record, with a startup grace window re-verified by a delayed
//! command. Client death removes the entry and re-triggers resolution.

use audiod_common::config::MODE_VERIFY_GRACE_MS;
use audiod_common::types::{AudioMode, ClientId};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One client's outstanding mode request
#[derive(Debug, Clone)]
pub struct ModeRequest {
    pub client: ClientId,
    pub mode: AudioMode,
    pub privileged: bool,
    pub updated_at: Instant,
    pub playback_active: bool,
    pub recording_active: bool,
    /// End of the provisional-activity window for unprivileged
    /// in-communication requests
    grace_until: Option<Instant>,
}

impl ModeRequest {
    /// Whether this entry currently competes for ownership
    fn is_active(&self, now: Instant) -> bool {
        if self.privileged {
            return true;
        }
        match self.mode {
            AudioMode::Ringtone | AudioMode::CallScreening => true,
            AudioMode::InCommunication => {
                self.playback_active
                    || self.recording_active
                    || self.grace_until.map(|g| now < g).unwrap_or(false)
            }
            _ => false,
        }
    }
}

/// The mode request stack
pub struct ModeArbiter {
    entries: Vec<ModeRequest>,
    grace: Duration,
}

impl ModeArbiter {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            grace: Duration::from_millis(MODE_VERIFY_GRACE_MS),
        }
    }

    /// Insert or update a client's request; `Normal` removes the entry.
    /// Returns whether the stack changed.
    pub fn request(
        &mut self,
        client: ClientId,
        mode: AudioMode,
        privileged: bool,
        now: Instant,
    ) -> bool {
        if mode == AudioMode::Normal {
            return self.remove_client(client);
        }
        let grace_until = if !privileged && mode == AudioMode::InCommunication {
            Some(now + self.grace)
        } else {
            None
        };
        if let Some(entry) = self.entries.iter_mut().find(|e| e.client == client) {
            entry.mode = mode;
            entry.privileged = privileged;
            entry.updated_at = now;
            entry.grace_until = grace_until;
        } else {
            debug!(%client, ?mode, privileged, "new mode request");
            self.entries.push(ModeRequest {
                client,
                mode,
                privileged,
                updated_at: now,
                playback_active: false,
                recording_active: false,
                grace_until,
            });
        }
        true
    }

    /// Update a client's live playback/recording state
    pub fn set_activity(&mut self, client: ClientId, playback: bool, recording: bool) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.client == client) {
            entry.playback_active = playback;
            entry.recording_active = recording;
            true
        } else {
            false
        }
    }

    /// Remove a dead (or explicitly normal) client; returns whether an
    /// entry existed
    pub fn remove_client(&mut self, client: ClientId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.client != client);
        if self.entries.len() != before {
            info!(%client, "mode request removed");
            true
        } else {
            false
        }
    }

    /// Grace-window re-verification: drop the entry if it never became
    /// genuinely active. Returns whether it was dropped.
    pub fn verify(&mut self, client: ClientId, now: Instant) -> bool {
        let stale = self.entries.iter().any(|e| {
            e.client == client
                && !e.privileged
                && e.mode == AudioMode::InCommunication
                && !e.playback_active
                && !e.recording_active
                && e.grace_until.map(|g| now >= g).unwrap_or(true)
        });
        if stale {
            info!(%client, "dropping never-active mode request after grace window");
            self.entries.retain(|e| e.client != client);
        }
        stale
    }

    /// Whether a client still needs periodic re-verification
    pub fn needs_verification(&self, client: ClientId) -> bool {
        self.entries.iter().any(|e| {
            e.client == client && !e.privileged && e.mode == AudioMode::InCommunication
        })
    }

    /// Resolve the current owner: the most-recently-updated privileged
    /// active entry, else the most-recently-updated active entry; no
    /// active entry means no owner (Normal).
    pub fn resolve_owner(&self, now: Instant) -> Option<&ModeRequest> {
        let active = self.entries.iter().filter(|e| e.is_active(now));
        let mut best: Option<&ModeRequest> = None;
        for entry in active {
            best = match best {
                None => Some(entry),
                Some(current) => {
                    let wins = (entry.privileged, entry.updated_at)
                        > (current.privileged, current.updated_at);
                    if wins {
                        Some(entry)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best
    }

    /// Effective system mode for the current stack
    pub fn resolved_mode(&self, now: Instant) -> AudioMode {
        self.resolve_owner(now)
            .map(|e| e.mode)
            .unwrap_or(AudioMode::Normal)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ModeArbiter {
    fn default() -> Self {
        Self::new()
    }
}
