//! Ringer mode, zen and internal mute recomputation
//!
//! Any input change (ringer mode, zen level or policy, call path, dtmf
//! alias) recomputes the full internal-mute set and applies only the
//! diff. The ring-aliased streams get their zero indices repaired on
//! unmute so a ring never stays silently pinned at zero.

use super::core::VolumeEngine;
use crate::error::Result;
use crate::ringer::{self, RingerContext};
use crate::serializer::Command;
use audiod_common::config::VOLUME_STEP;
use audiod_common::events::AudioEvent;
use audiod_common::types::{AudioStream, RingerMode, StreamSet, ZenMode, ZenPolicy};
use tracing::info;

impl VolumeEngine {
    pub(crate) fn handle_set_ringer_mode(
        &mut self,
        mode: RingerMode,
        external: bool,
    ) -> Result<()> {
        // An external transition out of silent ends the interruption
        // filter that was backing it; internal transitions leave zen alone
        if external
            && self.ringer_mode_external == RingerMode::Silent
            && mode != RingerMode::Silent
            && self.zen != ZenMode::Off
        {
            self.handle_set_zen_mode(ZenMode::Off)?;
        }

        let (internal, visible) = if external {
            // Vibrate on a vibratorless device degrades to silent
            // semantics internally while the UI still shows vibrate
            let internal = if mode == RingerMode::Vibrate && !self.config.has_vibrator {
                RingerMode::Silent
            } else {
                mode
            };
            (internal, mode)
        } else {
            (mode, mode)
        };

        if visible != self.ringer_mode_external {
            self.bus.emit_lossy(AudioEvent::RingerModeChanged {
                old_mode: self.ringer_mode_external,
                new_mode: visible,
                external: true,
                timestamp: chrono::Utc::now(),
            });
            self.ringer_mode_external = visible;
        }

        if internal != self.ringer_mode {
            info!(old = ?self.ringer_mode, new = ?internal, "ringer mode changed");
            self.bus.emit_lossy(AudioEvent::RingerModeChanged {
                old_mode: self.ringer_mode,
                new_mode: internal,
                external: false,
                timestamp: chrono::Utc::now(),
            });
            self.ringer_mode = internal;
            self.queue.push(Command::PersistRingerMode);
            self.recompute_internal_mutes();
        }

        self.state
            .set_ringer_modes(self.ringer_mode, self.ringer_mode_external);
        self.update_ringer_call_routing();
        Ok(())
    }

    pub(crate) fn handle_set_zen_mode(&mut self, zen: ZenMode) -> Result<()> {
        if self.zen == zen {
            return Ok(());
        }
        info!(old = ?self.zen, new = ?zen, "zen mode changed");
        self.zen = zen;
        self.state.set_zen(zen);
        self.bus.emit_lossy(AudioEvent::ZenModeChanged {
            zen,
            timestamp: chrono::Utc::now(),
        });
        self.recompute_internal_mutes();
        Ok(())
    }

    pub(crate) fn handle_set_zen_policy(&mut self, policy: ZenPolicy) -> Result<()> {
        if self.zen_policy == policy {
            return Ok(());
        }
        self.zen_policy = policy;
        self.state.set_zen_policy(policy);
        self.recompute_internal_mutes();
        Ok(())
    }

    pub(crate) fn handle_set_ringer_affected_streams(
        &mut self,
        streams: Option<StreamSet>,
    ) -> Result<()> {
        if self.affected_override == streams {
            return Ok(());
        }
        info!(override_set = ?streams, "ringer-affected override changed");
        self.affected_override = streams;
        self.recompute_internal_mutes();
        Ok(())
    }

    pub(crate) fn handle_set_call_path_active(&mut self, active: bool) -> Result<()> {
        if self.call_path_active == active {
            return Ok(());
        }
        info!(active, "call path changed");
        self.call_path_active = active;
        self.state.set_call_path_active(active);
        self.recompute_internal_mutes();
        self.update_ringer_call_routing();
        Ok(())
    }

    /// Ringing through the call path is wanted exactly while a vibrate
    /// ringer coexists with an active voice connection
    fn update_ringer_call_routing(&mut self) {
        let should_route =
            self.ringer_mode_external == RingerMode::Vibrate && self.call_path_active;
        if should_route != self.ringer_routed_to_call {
            self.ringer_routed_to_call = should_route;
            self.state.set_ringer_routed_to_call(should_route);
            self.bus.emit_lossy(AudioEvent::RingerRouteToCall {
                enabled: should_route,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Recompute the internal-mute set and apply the diff
    pub(crate) fn recompute_internal_mutes(&mut self) {
        let ctx = RingerContext {
            ringer_mode: self.ringer_mode,
            zen: self.zen,
            zen_policy: self.zen_policy,
            affected_override: self.affected_override,
            dtmf_alias: self.volumes.read().unwrap().alias_of(AudioStream::Dtmf),
            call_path_active: self.call_path_active,
        };
        let desired = ringer::mute_set(&self.config, &ctx);

        let mut toggled = Vec::new();
        {
            let mut volumes = self.volumes.write().unwrap();
            for stream in AudioStream::ALL {
                let should = desired.contains(stream);
                if volumes.stream(stream).is_muted_internally() == should {
                    continue;
                }
                volumes.stream_mut(stream).set_muted_internally(should);
                if !should && volumes.alias_of(stream) == AudioStream::Ring {
                    // Rings must never come back audible at index zero
                    let pinned: Vec<_> = volumes
                        .stream(stream)
                        .entries()
                        .filter(|(_, index)| *index == 0)
                        .map(|(device, _)| device)
                        .collect();
                    for device in pinned {
                        volumes.stream_mut(stream).load_index(VOLUME_STEP, device);
                    }
                }
                toggled.push(stream);
            }
        }
        for stream in toggled {
            self.apply_native(stream, self.active_device);
        }
    }
}
