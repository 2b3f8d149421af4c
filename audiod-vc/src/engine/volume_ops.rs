//! Stream and group volume command handling
//!
//! Writes always land on the alias representative stream and fan out to
//! every member, rescaled into the member's range inside the same command.
//! Native applies snapshot the value outside the table lock; persistence
//! is a debounced delayed command.

use super::core::VolumeEngine;
use crate::error::Result;
use crate::safety::{PendingVolumeRequest, SafeVolumeDecision};
use crate::serializer::Command;
use crate::volume::rescale_index;
use audiod_common::config::{index_to_ui, NATIVE_RETRY_DELAY_MS, PERSIST_DEBOUNCE_MS, VOLUME_STEP};
use audiod_common::events::AudioEvent;
use audiod_common::types::{
    AudioStream, DeviceType, DeviceVolumeBehavior, VolumeDirection, VolumeFlags,
};
use std::time::{Duration, Instant};
use tracing::{info, warn};

impl VolumeEngine {
    pub(crate) fn handle_set_stream_volume(
        &mut self,
        stream: AudioStream,
        device: DeviceType,
        index: i32,
        privileged: bool,
        mut flags: VolumeFlags,
    ) -> Result<()> {
        let target = self.volumes.read().unwrap().alias_of(stream);

        let mut requested = index;
        if self.state.device_behavior(device) == DeviceVolumeBehavior::Fixed {
            let max = self.config.range(target).max;
            requested = if requested > 0 { max } else { 0 };
        }

        // Media writes to risky devices go through the safety guard
        if target == AudioStream::Music {
            let risky = self.config.is_risky_device(device);
            match self.guard.check(requested, device, risky) {
                SafeVolumeDecision::Allow => {
                    // An in-range request supersedes any stale deferral
                    self.guard.clear_pending();
                }
                SafeVolumeDecision::Cap { capped } => {
                    self.guard.set_pending(PendingVolumeRequest {
                        stream: target,
                        device,
                        index: requested,
                        flags,
                    });
                    self.bus.emit_lossy(AudioEvent::SafeVolumeWarning {
                        stream: target,
                        device,
                        requested_index: requested,
                        timestamp: chrono::Utc::now(),
                    });
                    flags.show_safe_warning = true;
                    requested = capped;
                }
            }
        }

        self.write_stream_index(target, device, requested, privileged, flags)
    }

    pub(crate) fn handle_adjust_stream_volume(
        &mut self,
        stream: AudioStream,
        device: DeviceType,
        direction: VolumeDirection,
        privileged: bool,
        flags: VolumeFlags,
    ) -> Result<()> {
        let target = self.volumes.read().unwrap().alias_of(stream);
        match direction {
            VolumeDirection::Lower | VolumeDirection::Raise | VolumeDirection::Same => {
                let (current, silenced) = {
                    let volumes = self.volumes.read().unwrap();
                    let state = volumes.stream(target);
                    (state.index(device), state.is_muted_internally())
                };
                let index = match direction {
                    VolumeDirection::Lower => current - VOLUME_STEP,
                    VolumeDirection::Raise => current + VOLUME_STEP,
                    _ => current,
                };
                let mut flags = flags;
                if silenced && self.ringer_mode.mutes_ringer_streams() {
                    // The keys moved but the ringer keeps this stream quiet
                    flags.show_silent_hint = true;
                }
                self.handle_set_stream_volume(target, device, index, privileged, flags)
            }
            VolumeDirection::Mute => self.handle_set_stream_mute(target, true),
            VolumeDirection::Unmute => self.handle_set_stream_mute(target, false),
            VolumeDirection::ToggleMute => {
                let muted = self.volumes.read().unwrap().stream(target).is_muted();
                self.handle_set_stream_mute(target, !muted)
            }
        }
    }

    pub(crate) fn handle_set_stream_mute(
        &mut self,
        stream: AudioStream,
        muted: bool,
    ) -> Result<()> {
        let target = self.volumes.read().unwrap().alias_of(stream);
        let changed = self
            .volumes
            .write()
            .unwrap()
            .stream_mut(target)
            .set_muted(muted);
        if changed {
            info!(stream = %target, muted, "explicit mute changed");
            self.apply_native(target, self.active_device);
            self.bus.emit_lossy(AudioEvent::MuteChanged {
                stream: target,
                muted,
                timestamp: chrono::Utc::now(),
            });
        }
        Ok(())
    }

    pub(crate) fn handle_set_group_volume(
        &mut self,
        group: &str,
        device: DeviceType,
        index: i32,
    ) -> Result<()> {
        let (changed, stored, bridged) = match self.groups.get_mut(group) {
            Some(state) => {
                let changed = state.set_index(index, device);
                (changed, state.index(device), state.bridged_stream())
            }
            None => {
                warn!(group, "unknown volume group");
                return Ok(());
            }
        };

        if changed {
            self.bus.emit_lossy(AudioEvent::GroupVolumeChanged {
                group: group.to_string(),
                device,
                index: stored,
                timestamp: chrono::Utc::now(),
            });
            self.queue.push_delayed(
                Command::PersistGroupVolume {
                    group: group.to_string(),
                    device,
                },
                Instant::now() + Duration::from_millis(PERSIST_DEBOUNCE_MS),
            );
        }

        if let Some(stream) = bridged {
            // Skip the native round trip when the legacy stream already
            // carries this value
            let applied = self.volumes.read().unwrap().stream(stream).index(device);
            if applied != stored {
                self.handle_set_stream_volume(
                    stream,
                    device,
                    stored,
                    true,
                    VolumeFlags::default(),
                )?;
            }
        }
        Ok(())
    }

    pub(crate) fn handle_set_device_volume_behavior(
        &mut self,
        device: DeviceType,
        behavior: DeviceVolumeBehavior,
    ) -> Result<()> {
        self.state.set_device_behavior(device, behavior);
        info!(%device, ?behavior, "device volume behavior changed");
        self.bus.emit_lossy(AudioEvent::DeviceVolumeBehaviorChanged {
            device,
            behavior,
            timestamp: chrono::Utc::now(),
        });

        if behavior == DeviceVolumeBehavior::Fixed {
            // Snap every representative stream's stored index to {0, max}
            for stream in self.representative_streams() {
                let (index, max) = {
                    let volumes = self.volumes.read().unwrap();
                    let state = volumes.stream(stream);
                    (state.index(device), state.max_index())
                };
                let snapped = if index > 0 { max } else { 0 };
                self.write_stream_index(stream, device, snapped, true, VolumeFlags::default())?;
            }
        }
        // Full/Variable change how stored values render, so re-push them
        for stream in self.representative_streams() {
            self.apply_native(stream, device);
        }
        Ok(())
    }

    pub(crate) fn handle_set_active_device(&mut self, device: DeviceType) -> Result<()> {
        if self.active_device == device {
            return Ok(());
        }
        info!(old = %self.active_device, new = %device, "active device changed");
        self.active_device = device;
        self.state.set_active_device(device);
        // Routing change: push every stream's index for the new device
        for stream in self.representative_streams() {
            self.apply_native(stream, device);
        }
        Ok(())
    }

    /// Store a clamped index on the representative stream and fan out to
    /// alias members; emits, applies and schedules persistence on change.
    pub(crate) fn write_stream_index(
        &mut self,
        target: AudioStream,
        device: DeviceType,
        index: i32,
        privileged: bool,
        flags: VolumeFlags,
    ) -> Result<()> {
        let mut changed_streams = Vec::new();
        let old_index;
        let new_index;
        {
            let mut volumes = self.volumes.write().unwrap();
            let members = volumes.aliased_to(target);
            let src_range = volumes.stream(target).range();
            old_index = volumes.stream(target).index(device);

            if !volumes.stream_mut(target).set_index(index, device, privileged) {
                return Ok(());
            }
            new_index = volumes.stream(target).index(device);
            changed_streams.push(target);

            for member in members {
                if member == target {
                    continue;
                }
                let dst_range = volumes.stream(member).range();
                let rescaled = rescale_index(new_index, &src_range, &dst_range);
                volumes.stream_mut(member).load_index(rescaled, device);
                changed_streams.push(member);
            }
        }

        info!(
            stream = %target,
            %device,
            old_index,
            new_index,
            members = changed_streams.len() - 1,
            "volume changed"
        );

        for stream in &changed_streams {
            self.apply_native(*stream, device);
            self.schedule_persist(*stream, device);
        }

        // Change events fire only for the currently routed device
        if device == self.active_device || device == DeviceType::Default {
            self.bus.emit_lossy(AudioEvent::VolumeChanged {
                stream: target,
                device,
                old_index,
                new_index,
                flags,
                timestamp: chrono::Utc::now(),
            });
        }
        Ok(())
    }

    /// Streams that are their own alias representative
    pub(crate) fn representative_streams(&self) -> Vec<AudioStream> {
        let volumes = self.volumes.read().unwrap();
        AudioStream::ALL
            .iter()
            .copied()
            .filter(|s| volumes.alias_of(*s) == *s)
            .collect()
    }

    /// Snapshot, convert and push one stream/device value to the native
    /// engine; failures schedule a fixed-delay retry.
    pub(crate) fn apply_native(&mut self, stream: AudioStream, device: DeviceType) {
        let (index, muted, max) = {
            let volumes = self.volumes.read().unwrap();
            let state = volumes.stream(stream);
            (state.index(device), state.is_fully_muted(), state.max_index())
        };
        let effective = if muted {
            0
        } else if self.state.device_behavior(device) == DeviceVolumeBehavior::Full {
            max
        } else {
            index
        };
        if let Err(e) = self
            .backend
            .set_stream_index(stream, index_to_ui(effective), device)
        {
            warn!(stream = %stream, %device, error = %e, "native apply failed, scheduling retry");
            self.queue.push_delayed(
                Command::RetryNativeApply { stream, device },
                Instant::now() + Duration::from_millis(NATIVE_RETRY_DELAY_MS),
            );
        }
    }

    pub(crate) fn schedule_persist(&mut self, stream: AudioStream, device: DeviceType) {
        self.queue.push_delayed(
            Command::PersistStreamVolume { stream, device },
            Instant::now() + Duration::from_millis(PERSIST_DEBOUNCE_MS),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::super::core::testing::engine_fixture;
    use crate::serializer::Command;
    use audiod_common::events::AudioEvent;
    use audiod_common::types::{
        AudioStream, DeviceType, DeviceVolumeBehavior, RingerMode, VolumeDirection, VolumeFlags,
    };

    fn set_volume(stream: AudioStream, device: DeviceType, index: i32) -> Command {
        Command::SetStreamVolume {
            stream,
            device,
            index,
            privileged: false,
            flags: VolumeFlags::default(),
        }
    }

    #[tokio::test]
    async fn test_alias_write_lands_on_representative() {
        let mut fx = engine_fixture().await;
        // Notification aliases to Ring: the write goes to Ring and fans
        // back out to every member
        fx.engine
            .dispatch(set_volume(AudioStream::Notification, DeviceType::Speaker, 30))
            .await
            .unwrap();

        let volumes = fx.engine.volumes();
        let volumes = volumes.read().unwrap();
        assert_eq!(volumes.stream(AudioStream::Ring).index(DeviceType::Speaker), 30);
        // Same [0,70] range, so members carry the identical index
        assert_eq!(
            volumes.stream(AudioStream::Notification).index(DeviceType::Speaker),
            30
        );
        assert_eq!(volumes.stream(AudioStream::System).index(DeviceType::Speaker), 30);
    }

    #[tokio::test]
    async fn test_native_apply_in_ui_units() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(set_volume(AudioStream::Music, DeviceType::Speaker, 60))
            .await
            .unwrap();
        assert_eq!(
            fx.backend.last_applied(AudioStream::Music, DeviceType::Speaker),
            Some(6)
        );
    }

    #[tokio::test]
    async fn test_adjust_moves_one_step() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(set_volume(AudioStream::Music, DeviceType::Speaker, 50))
            .await
            .unwrap();
        fx.engine
            .dispatch(Command::AdjustStreamVolume {
                stream: AudioStream::Music,
                device: DeviceType::Speaker,
                direction: VolumeDirection::Raise,
                privileged: false,
                flags: VolumeFlags::default(),
            })
            .await
            .unwrap();
        let volumes = fx.engine.volumes();
        assert_eq!(
            volumes.read().unwrap().stream(AudioStream::Music).index(DeviceType::Speaker),
            60
        );

        fx.engine
            .dispatch(Command::AdjustStreamVolume {
                stream: AudioStream::Music,
                device: DeviceType::Speaker,
                direction: VolumeDirection::Lower,
                privileged: false,
                flags: VolumeFlags::default(),
            })
            .await
            .unwrap();
        assert_eq!(
            volumes.read().unwrap().stream(AudioStream::Music).index(DeviceType::Speaker),
            50
        );
    }

    #[tokio::test]
    async fn test_adjust_on_ringer_silenced_stream_carries_hint() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(Command::SetRingerMode {
                mode: RingerMode::Silent,
                external: false,
            })
            .await
            .unwrap();
        let mut rx = fx.bus.subscribe();

        fx.engine
            .dispatch(Command::AdjustStreamVolume {
                stream: AudioStream::Ring,
                device: DeviceType::Speaker,
                direction: VolumeDirection::Raise,
                privileged: false,
                flags: VolumeFlags::default(),
            })
            .await
            .unwrap();
        let mut hinted = false;
        while let Ok(event) = rx.try_recv() {
            if let AudioEvent::VolumeChanged {
                stream: AudioStream::Ring,
                flags,
                ..
            } = event
            {
                assert!(flags.show_silent_hint);
                hinted = true;
            }
        }
        assert!(hinted);

        // No hint once the ringer is audible again
        fx.engine
            .dispatch(Command::SetRingerMode {
                mode: RingerMode::Normal,
                external: false,
            })
            .await
            .unwrap();
        let mut rx = fx.bus.subscribe();
        fx.engine
            .dispatch(Command::AdjustStreamVolume {
                stream: AudioStream::Ring,
                device: DeviceType::Speaker,
                direction: VolumeDirection::Lower,
                privileged: false,
                flags: VolumeFlags::default(),
            })
            .await
            .unwrap();
        while let Ok(event) = rx.try_recv() {
            if let AudioEvent::VolumeChanged { flags, .. } = event {
                assert!(!flags.show_silent_hint);
            }
        }
    }

    #[tokio::test]
    async fn test_mute_applies_zero_and_restores() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(set_volume(AudioStream::Music, DeviceType::Speaker, 80))
            .await
            .unwrap();

        fx.engine
            .dispatch(Command::SetStreamMute {
                stream: AudioStream::Music,
                muted: true,
            })
            .await
            .unwrap();
        assert_eq!(
            fx.backend.last_applied(AudioStream::Music, DeviceType::Speaker),
            Some(0)
        );
        // Stored index untouched by the mute gate
        let volumes = fx.engine.volumes();
        assert_eq!(
            volumes.read().unwrap().stream(AudioStream::Music).index(DeviceType::Speaker),
            80
        );

        fx.engine
            .dispatch(Command::SetStreamMute {
                stream: AudioStream::Music,
                muted: false,
            })
            .await
            .unwrap();
        assert_eq!(
            fx.backend.last_applied(AudioStream::Music, DeviceType::Speaker),
            Some(8)
        );
    }

    #[tokio::test]
    async fn test_volume_event_only_on_routed_device() {
        let mut fx = engine_fixture().await;
        let mut rx = fx.bus.subscribe();

        // Speaker is the routed device in the fixture
        fx.engine
            .dispatch(set_volume(AudioStream::Music, DeviceType::Speaker, 60))
            .await
            .unwrap();
        assert!(matches!(rx.try_recv(), Ok(AudioEvent::VolumeChanged { .. })));

        fx.engine
            .dispatch(set_volume(AudioStream::Music, DeviceType::Hdmi, 70))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fixed_behavior_snaps_writes() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(Command::SetDeviceVolumeBehavior {
                device: DeviceType::Hdmi,
                behavior: DeviceVolumeBehavior::Fixed,
            })
            .await
            .unwrap();

        fx.engine
            .dispatch(set_volume(AudioStream::Music, DeviceType::Hdmi, 40))
            .await
            .unwrap();
        let volumes = fx.engine.volumes();
        assert_eq!(
            volumes.read().unwrap().stream(AudioStream::Music).index(DeviceType::Hdmi),
            150
        );

        fx.engine
            .dispatch(set_volume(AudioStream::Music, DeviceType::Hdmi, 0))
            .await
            .unwrap();
        assert_eq!(
            volumes.read().unwrap().stream(AudioStream::Music).index(DeviceType::Hdmi),
            0
        );
    }

    #[tokio::test]
    async fn test_bridged_group_skips_redundant_apply() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(set_volume(AudioStream::Music, DeviceType::Speaker, 60))
            .await
            .unwrap();
        fx.backend.clear();

        // Group write carrying the value the stream already has
        fx.engine
            .dispatch(Command::SetGroupVolume {
                group: "media".to_string(),
                device: DeviceType::Speaker,
                index: 60,
            })
            .await
            .unwrap();
        assert_eq!(
            fx.backend.last_applied(AudioStream::Music, DeviceType::Speaker),
            None
        );

        // A different value goes through to the bridged stream
        fx.engine
            .dispatch(Command::SetGroupVolume {
                group: "media".to_string(),
                device: DeviceType::Speaker,
                index: 90,
            })
            .await
            .unwrap();
        assert_eq!(
            fx.backend.last_applied(AudioStream::Music, DeviceType::Speaker),
            Some(9)
        );
    }

    #[tokio::test]
    async fn test_failed_apply_schedules_retry() {
        let mut fx = engine_fixture().await;
        let delayed_before = fx.engine.queue.delayed_len();
        fx.backend.set_fail_applies(true);

        fx.engine
            .dispatch(set_volume(AudioStream::Music, DeviceType::Speaker, 60))
            .await
            .unwrap();
        assert!(fx.engine.queue.delayed_len() > delayed_before);

        // Retry succeeds once the backend recovers
        fx.backend.set_fail_applies(false);
        fx.engine
            .dispatch(Command::RetryNativeApply {
                stream: AudioStream::Music,
                device: DeviceType::Speaker,
            })
            .await
            .unwrap();
        assert_eq!(
            fx.backend.last_applied(AudioStream::Music, DeviceType::Speaker),
            Some(6)
        );
    }
}
