//! Mode request handling and ownership resolution
//!
//! Every arbiter mutation re-resolves ownership; an owner change applies
//! the mode natively, rebinds the DTMF alias (tones follow the call while
//! one is up), force-reapplies the active stream, and broadcasts the
//! change.

use super::core::VolumeEngine;
use crate::error::Result;
use crate::serializer::{Command, CommandKey};
use crate::volume::rescale_index;
use audiod_common::config::MODE_VERIFY_GRACE_MS;
use audiod_common::events::AudioEvent;
use audiod_common::types::{AudioMode, AudioStream, ClientId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

impl VolumeEngine {
    pub(crate) fn handle_set_mode(
        &mut self,
        client: ClientId,
        mode: AudioMode,
        privileged: bool,
    ) -> Result<()> {
        let now = Instant::now();
        self.arbiter.request(client, mode, privileged, now);

        if mode == AudioMode::Normal {
            self.queue.cancel_delayed(&CommandKey::VerifyMode(client));
        } else if self.arbiter.needs_verification(client) {
            // One rearmed timer per client
            self.queue.push_delayed(
                Command::VerifyModeClient { client },
                now + Duration::from_millis(MODE_VERIFY_GRACE_MS),
            );
        }
        self.resolve_and_apply_mode()
    }

    pub(crate) fn handle_set_client_activity(
        &mut self,
        client: ClientId,
        playback: bool,
        recording: bool,
    ) -> Result<()> {
        if self.arbiter.set_activity(client, playback, recording) {
            self.resolve_and_apply_mode()?;
        }
        Ok(())
    }

    pub(crate) fn handle_verify_mode_client(&mut self, client: ClientId) -> Result<()> {
        if self.arbiter.verify(client, Instant::now()) {
            self.resolve_and_apply_mode()?;
        }
        Ok(())
    }

    pub(crate) fn handle_client_disconnected(&mut self, client: ClientId) -> Result<()> {
        self.queue.cancel_delayed(&CommandKey::VerifyMode(client));
        if self.arbiter.remove_client(client) {
            self.resolve_and_apply_mode()?;
        }
        Ok(())
    }

    /// Re-resolve ownership and apply the outcome if it changed
    pub(crate) fn resolve_and_apply_mode(&mut self) -> Result<()> {
        let now = Instant::now();
        let (mode, owner_pid) = match self.arbiter.resolve_owner(now) {
            Some(entry) => (entry.mode, Some(entry.client.pid)),
            None => (AudioMode::Normal, None),
        };
        if mode == self.current_mode && owner_pid == self.current_owner_pid {
            return Ok(());
        }
        info!(old = ?self.current_mode, new = ?mode, ?owner_pid, "audio mode changed");

        // Recoverable; a restart notification re-applies the mode
        if let Err(e) = self.backend.set_mode(mode) {
            warn!(error = %e, "native mode apply failed");
        }
        self.current_mode = mode;
        self.current_owner_pid = owner_pid;
        self.state.set_mode(mode, owner_pid);

        let dtmf_target = if matches!(mode, AudioMode::InCall | AudioMode::InCommunication) {
            AudioStream::VoiceCall
        } else {
            self.config.alias_of(AudioStream::Dtmf)
        };
        self.rebind_dtmf(dtmf_target);

        // Gain curves can be mode-dependent, so the active stream gets a
        // re-apply even with an unchanged index
        let active_stream = if matches!(
            mode,
            AudioMode::InCall | AudioMode::InCommunication | AudioMode::CallScreening
        ) {
            AudioStream::VoiceCall
        } else {
            AudioStream::Music
        };
        self.apply_native(active_stream, self.active_device);

        self.bus.emit_lossy(AudioEvent::ModeChanged {
            mode,
            owner_pid,
            timestamp: chrono::Utc::now(),
        });
        self.recompute_internal_mutes();
        Ok(())
    }

    /// Retarget the DTMF alias and reseed its indices from the new
    /// representative, rescaled into the DTMF range
    pub(crate) fn rebind_dtmf(&mut self, target: AudioStream) {
        if self.volumes.read().unwrap().alias_of(AudioStream::Dtmf) == target {
            return;
        }
        // Revalidates the whole table, so a chained alias never lands
        let aliases = match self.config.with_dtmf_alias(target) {
            Ok(config) => config.aliases,
            Err(e) => {
                warn!(%target, error = %e, "dtmf alias target rejected");
                return;
            }
        };
        {
            let mut volumes = self.volumes.write().unwrap();
            volumes.set_aliases(aliases);

            let src_range = volumes.stream(target).range();
            let dst_range = volumes.stream(AudioStream::Dtmf).range();
            let entries: Vec<_> = volumes.stream(target).entries().collect();
            for (device, index) in entries {
                let rescaled = rescale_index(index, &src_range, &dst_range);
                volumes
                    .stream_mut(AudioStream::Dtmf)
                    .load_index(rescaled, device);
            }
        }
        debug!(%target, "dtmf alias rebound");
        self.apply_native(AudioStream::Dtmf, self.active_device);
    }
}
