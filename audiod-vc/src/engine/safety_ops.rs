//! Safe volume guard driving
//!
//! The guard's decisions are made inline in the volume write path; this
//! block drives its state machine: the periodic listening poll, explicit
//! enable/disable with pending-request replay, and cap re-enforcement
//! across every risky device when the guard (re)arms.

use super::core::VolumeEngine;
use crate::error::Result;
use crate::serializer::Command;
use audiod_common::config::SAFE_VOLUME_CHECK_INTERVAL_MS;
use audiod_common::types::{AudioStream, VolumeFlags};
use std::time::{Duration, Instant};
use tracing::info;

impl VolumeEngine {
    pub(crate) fn handle_set_safe_volume_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled {
            if self.guard.enable_enforcement() {
                info!("safe volume enforcement enabled");
                self.enforce_all_caps()?;
            }
        } else {
            info!("safe volume enforcement disabled");
            if let Some(pending) = self.guard.disable_enforcement() {
                // The deferred over-cap request goes through now that the
                // cap is lifted
                self.handle_set_stream_volume(
                    pending.stream,
                    pending.device,
                    pending.index,
                    false,
                    pending.flags,
                )?;
            }
        }
        self.state.set_safe_volume_active(self.guard.is_active());
        self.queue.push(Command::PersistSafeVolumeState);
        Ok(())
    }

    /// One periodic listening poll; always rearms itself
    pub(crate) fn handle_safe_volume_check(&mut self) -> Result<()> {
        let music_index = self
            .volumes
            .read()
            .unwrap()
            .stream(AudioStream::Music)
            .index(self.active_device);
        let above_cap = self.backend.is_stream_active(AudioStream::Music)
            && self.config.is_risky_device(self.active_device)
            && music_index > self.guard.safe_index(self.active_device);

        if self.guard.note_music_activity(SAFE_VOLUME_CHECK_INTERVAL_MS, above_cap) {
            self.state.set_safe_volume_active(true);
            self.enforce_all_caps()?;
        }
        if above_cap {
            // The counter only moves while risky listening continues
            self.queue.push(Command::PersistSafeVolumeState);
        }

        self.queue.push_delayed(
            Command::SafeVolumeCheck,
            Instant::now() + Duration::from_millis(SAFE_VOLUME_CHECK_INTERVAL_MS),
        );
        Ok(())
    }

    /// Pull every risky device's stored media index down to its cap
    pub(crate) fn enforce_all_caps(&mut self) -> Result<()> {
        for device in self.config.risky_devices.clone() {
            let cap = self.guard.safe_index(device);
            let index = self
                .volumes
                .read()
                .unwrap()
                .stream(AudioStream::Music)
                .index(device);
            if index > cap {
                info!(%device, index, cap, "re-applying safe volume cap");
                self.write_stream_index(
                    AudioStream::Music,
                    device,
                    cap,
                    true,
                    VolumeFlags::default(),
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::core::testing::engine_fixture;
    use crate::safety::GuardState;
    use crate::serializer::Command;
    use audiod_common::events::AudioEvent;
    use audiod_common::types::{AudioStream, DeviceType, VolumeFlags};

    fn set_music(device: DeviceType, index: i32) -> Command {
        Command::SetStreamVolume {
            stream: AudioStream::Music,
            device,
            index,
            privileged: false,
            flags: VolumeFlags::default(),
        }
    }

    #[tokio::test]
    async fn test_over_cap_request_is_capped_with_one_warning() {
        let mut fx = engine_fixture().await;
        assert_eq!(fx.engine.guard.state(), GuardState::Active);
        let mut rx = fx.bus.subscribe();

        fx.engine
            .dispatch(set_music(DeviceType::WiredHeadset, 140))
            .await
            .unwrap();

        // Stored value is the cap, the request is deferred
        let volumes = fx.engine.volumes();
        assert_eq!(
            volumes.read().unwrap().stream(AudioStream::Music).index(DeviceType::WiredHeadset),
            100
        );
        assert_eq!(fx.engine.guard.pending().unwrap().index, 140);

        let mut warnings = 0;
        while let Ok(event) = rx.try_recv() {
            if let AudioEvent::SafeVolumeWarning { requested_index, .. } = event {
                assert_eq!(requested_index, 140);
                warnings += 1;
            }
        }
        assert_eq!(warnings, 1);
    }

    #[tokio::test]
    async fn test_under_cap_request_clears_stale_pending() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(set_music(DeviceType::WiredHeadset, 140))
            .await
            .unwrap();
        assert!(fx.engine.guard.pending().is_some());

        fx.engine
            .dispatch(set_music(DeviceType::WiredHeadset, 80))
            .await
            .unwrap();
        assert!(fx.engine.guard.pending().is_none());
        let volumes = fx.engine.volumes();
        assert_eq!(
            volumes.read().unwrap().stream(AudioStream::Music).index(DeviceType::WiredHeadset),
            80
        );
    }

    #[tokio::test]
    async fn test_disable_replays_pending_request() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(set_music(DeviceType::WiredHeadset, 140))
            .await
            .unwrap();

        fx.engine
            .dispatch(Command::SetSafeVolumeEnabled { enabled: false })
            .await
            .unwrap();

        assert_eq!(fx.engine.guard.state(), GuardState::Inactive);
        assert!(!fx.state.safe_volume_active());
        let volumes = fx.engine.volumes();
        assert_eq!(
            volumes.read().unwrap().stream(AudioStream::Music).index(DeviceType::WiredHeadset),
            140
        );
    }

    #[tokio::test]
    async fn test_usb_cap_uses_derived_index() {
        let mut fx = engine_fixture().await;
        // Linear test curve puts the -37 dBFS point at UI 7
        fx.engine
            .dispatch(set_music(DeviceType::UsbHeadset, 100))
            .await
            .unwrap();
        let volumes = fx.engine.volumes();
        assert_eq!(
            volumes.read().unwrap().stream(AudioStream::Music).index(DeviceType::UsbHeadset),
            70
        );
    }

    #[tokio::test]
    async fn test_speaker_is_never_capped() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(set_music(DeviceType::Speaker, 150))
            .await
            .unwrap();
        let volumes = fx.engine.volumes();
        assert_eq!(
            volumes.read().unwrap().stream(AudioStream::Music).index(DeviceType::Speaker),
            150
        );
    }

    #[tokio::test]
    async fn test_listening_budget_rearms_and_enforces() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(Command::SetSafeVolumeEnabled { enabled: false })
            .await
            .unwrap();
        fx.engine
            .dispatch(set_music(DeviceType::WiredHeadset, 140))
            .await
            .unwrap();
        fx.engine
            .dispatch(Command::SetActiveDevice {
                device: DeviceType::WiredHeadset,
            })
            .await
            .unwrap();
        fx.backend.set_music_active(true);

        // 20 hours of above-cap listening in 60s polls
        let polls = 20 * 3600 / 60 + 1;
        for _ in 0..polls {
            fx.engine.dispatch(Command::SafeVolumeCheck).await.unwrap();
            if fx.engine.guard.state() == GuardState::Active {
                break;
            }
        }
        assert_eq!(fx.engine.guard.state(), GuardState::Active);
        // Re-arming pulled the stored index back under the cap
        let volumes = fx.engine.volumes();
        assert_eq!(
            volumes.read().unwrap().stream(AudioStream::Music).index(DeviceType::WiredHeadset),
            100
        );
    }

    #[tokio::test]
    async fn test_quiet_listening_never_arms() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(Command::SetSafeVolumeEnabled { enabled: false })
            .await
            .unwrap();
        fx.engine
            .dispatch(set_music(DeviceType::WiredHeadset, 80))
            .await
            .unwrap();
        fx.engine
            .dispatch(Command::SetActiveDevice {
                device: DeviceType::WiredHeadset,
            })
            .await
            .unwrap();
        fx.backend.set_music_active(true);

        for _ in 0..100 {
            fx.engine.dispatch(Command::SafeVolumeCheck).await.unwrap();
        }
        assert_eq!(fx.engine.guard.state(), GuardState::Inactive);
        assert_eq!(fx.engine.guard.music_active_ms(), 0);
    }
}
