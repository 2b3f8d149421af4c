//! Native restart replay and apply retries
//!
//! A restart notification replays, in order: every stream's range and
//! stored indices, the ringer/zen mute set, the resolved mode, and any
//! deferred safe-volume request. Bridged groups mirror their legacy
//! stream, so the index replay covers them. Cold boot uses the same path.

use super::core::VolumeEngine;
use crate::error::Result;
use crate::serializer::Command;
use audiod_common::config::index_to_ui;
use audiod_common::types::{AudioStream, DeviceType};
use tracing::{info, warn};

impl VolumeEngine {
    pub(crate) fn handle_native_restarted(&mut self) -> Result<()> {
        info!("native engine restarted, replaying state");

        for stream in AudioStream::ALL {
            let (range, devices) = {
                let volumes = self.volumes.read().unwrap();
                let state = volumes.stream(stream);
                (
                    state.range(),
                    state.entries().map(|(d, _)| d).collect::<Vec<_>>(),
                )
            };
            if let Err(e) =
                self.backend
                    .init_stream_range(stream, index_to_ui(range.min), index_to_ui(range.max))
            {
                warn!(%stream, error = %e, "range init failed, index retries will cover it");
            }
            for device in devices {
                self.apply_native(stream, device);
            }
        }

        // Cold boot starts with every internal mute bit clear even when a
        // muting ringer mode was restored; recomputing is a no-op for a
        // runtime restart
        self.recompute_internal_mutes();

        if let Err(e) = self.backend.set_mode(self.current_mode) {
            warn!(error = %e, "mode replay failed");
        }

        if let Some(pending) = self.guard.take_pending() {
            // Requeued through the normal write path; the guard decides
            // again and re-emits its warning if still over the cap
            self.queue.push(Command::SetStreamVolume {
                stream: pending.stream,
                device: pending.device,
                index: pending.index,
                privileged: false,
                flags: pending.flags,
            });
        }
        Ok(())
    }

    pub(crate) fn handle_retry_native_apply(
        &mut self,
        stream: AudioStream,
        device: DeviceType,
    ) -> Result<()> {
        // Rearms itself through apply_native on repeated failure
        self.apply_native(stream, device);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::core::testing::{engine_fixture, engine_fixture_on, memory_db};
    use crate::serializer::Command;
    use audiod_common::types::{AudioStream, DeviceType, RingerMode, VolumeFlags};

    #[tokio::test]
    async fn test_restart_replays_ranges_and_indices() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(Command::SetStreamVolume {
                stream: AudioStream::Music,
                device: DeviceType::Speaker,
                index: 90,
                privileged: false,
                flags: VolumeFlags::default(),
            })
            .await
            .unwrap();
        fx.backend.clear();

        fx.engine.dispatch(Command::NativeRestarted).await.unwrap();

        // Every stream's range is re-initialized
        assert_eq!(fx.backend.ranges.lock().unwrap().len(), AudioStream::ALL.len());
        // The stored media index is pushed back
        assert_eq!(
            fx.backend.last_applied(AudioStream::Music, DeviceType::Speaker),
            Some(9)
        );
        // Mode is replayed
        assert!(!fx.backend.modes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restart_reapplies_mute_as_zero() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(Command::SetRingerMode {
                mode: RingerMode::Silent,
                external: false,
            })
            .await
            .unwrap();
        fx.backend.clear();

        fx.engine.dispatch(Command::NativeRestarted).await.unwrap();
        assert_eq!(
            fx.backend.last_applied(AudioStream::Ring, DeviceType::Default),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_restart_requeues_deferred_safe_request() {
        let mut fx = engine_fixture().await;
        fx.engine
            .dispatch(Command::SetStreamVolume {
                stream: AudioStream::Music,
                device: DeviceType::WiredHeadset,
                index: 140,
                privileged: false,
                flags: VolumeFlags::default(),
            })
            .await
            .unwrap();
        assert!(fx.engine.guard.pending().is_some());

        fx.engine.dispatch(Command::NativeRestarted).await.unwrap();

        // The deferred request is back in the queue and, once executed,
        // the guard defers it again
        let mut requeued = false;
        while let Some(cmd) = fx.engine.queue.pop() {
            if matches!(cmd, Command::SetStreamVolume { index: 140, .. }) {
                requeued = true;
                fx.engine.dispatch(cmd).await.unwrap();
            }
        }
        assert!(requeued);
        assert_eq!(fx.engine.guard.pending().unwrap().index, 140);
    }

    #[tokio::test]
    async fn test_boot_with_persisted_silent_ringer_reapplies_mutes() {
        let db = memory_db().await;
        let mut fx = engine_fixture_on(db.clone()).await;
        fx.engine
            .dispatch(Command::SetRingerMode {
                mode: RingerMode::Silent,
                external: false,
            })
            .await
            .unwrap();
        fx.engine.dispatch(Command::PersistRingerMode).await.unwrap();

        // Fresh engine: the restored ringer mode must bring its mute set
        // along, not just the mode value
        let mut fx2 = engine_fixture_on(db).await;
        while let Some(cmd) = fx2.engine.queue.pop() {
            fx2.engine.dispatch(cmd).await.unwrap();
        }
        assert_eq!(fx2.engine.ringer_mode, RingerMode::Silent);
        let volumes = fx2.engine.volumes();
        assert!(volumes.read().unwrap().stream(AudioStream::Ring).is_muted_internally());
        assert_eq!(
            fx2.backend.last_applied(AudioStream::Ring, DeviceType::Speaker),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_cold_boot_restores_persisted_volume_natively() {
        let db = memory_db().await;
        let mut fx = engine_fixture_on(db.clone()).await;
        fx.engine
            .dispatch(Command::SetStreamVolume {
                stream: AudioStream::Music,
                device: DeviceType::Speaker,
                index: 120,
                privileged: false,
                flags: VolumeFlags::default(),
            })
            .await
            .unwrap();
        fx.engine
            .dispatch(Command::PersistStreamVolume {
                stream: AudioStream::Music,
                device: DeviceType::Speaker,
            })
            .await
            .unwrap();

        // Fresh engine: boot replay pushes the restored index
        let mut fx2 = engine_fixture_on(db).await;
        while let Some(cmd) = fx2.engine.queue.pop() {
            fx2.engine.dispatch(cmd).await.unwrap();
        }
        assert_eq!(
            fx2.backend.last_applied(AudioStream::Music, DeviceType::Speaker),
            Some(12)
        );
    }
}
