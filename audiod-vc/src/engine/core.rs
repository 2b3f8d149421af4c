//! Engine construction, run loop and command dispatch

use crate::db::settings;
use crate::error::Result;
use crate::liveness::LivenessWatch;
use crate::mode::ModeArbiter;
use crate::native::AudioBackend;
use crate::safety::SafeVolumeGuard;
use crate::serializer::{Command, CommandQueue};
use crate::state::ServiceState;
use crate::volume::{VolumeGroupState, VolumeTable};
use audiod_common::config::{PlatformConfiguration, SAFE_VOLUME_CHECK_INTERVAL_MS};
use audiod_common::events::EventBus;
use audiod_common::types::{
    AudioMode, AudioStream, DeviceType, DeviceVolumeBehavior, RingerMode, StreamSet, ZenMode,
    ZenPolicy,
};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Posting side of the engine command channel
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    /// Post a command; a closed engine drops it silently (shutdown race)
    pub fn post(&self, cmd: Command) {
        if self.tx.send(cmd).is_err() {
            warn!("engine channel closed, command dropped");
        }
    }
}

/// The single-task coordination engine
pub struct VolumeEngine {
    pub(crate) config: Arc<PlatformConfiguration>,
    pub(crate) volumes: Arc<RwLock<VolumeTable>>,
    pub(crate) groups: HashMap<String, VolumeGroupState>,
    pub(crate) guard: SafeVolumeGuard,
    pub(crate) arbiter: ModeArbiter,
    pub(crate) current_mode: AudioMode,
    pub(crate) current_owner_pid: Option<i32>,
    pub(crate) ringer_mode: RingerMode,
    pub(crate) ringer_mode_external: RingerMode,
    pub(crate) zen: ZenMode,
    pub(crate) zen_policy: ZenPolicy,
    /// Wholesale ringer-affected override from a policy delegate
    pub(crate) affected_override: Option<StreamSet>,
    pub(crate) call_path_active: bool,
    pub(crate) ringer_routed_to_call: bool,
    pub(crate) active_device: DeviceType,
    pub(crate) backend: Arc<dyn AudioBackend>,
    pub(crate) db: Pool<Sqlite>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) state: Arc<ServiceState>,
    pub(crate) liveness: Arc<LivenessWatch>,
    pub(crate) queue: CommandQueue,
    rx: mpsc::UnboundedReceiver<Command>,
    handle: EngineHandle,
    shutting_down: bool,
}

/// The attribute-addressed groups bridged to legacy streams
fn builtin_groups(config: &PlatformConfiguration) -> HashMap<String, VolumeGroupState> {
    let mut groups = HashMap::new();
    for (name, stream) in [
        ("media", AudioStream::Music),
        ("call", AudioStream::VoiceCall),
        ("alarms", AudioStream::Alarm),
        ("notifications", AudioStream::Notification),
    ] {
        groups.insert(
            name.to_string(),
            VolumeGroupState::bridged(name, stream, config.range(stream)),
        );
    }
    groups
}

impl VolumeEngine {
    /// Build the engine, restoring persisted state before the loop starts.
    ///
    /// Enqueues a native-restart replay (the cold boot path is the same as
    /// recovery) and arms the periodic safe-volume check.
    pub async fn new(
        config: Arc<PlatformConfiguration>,
        backend: Arc<dyn AudioBackend>,
        db: Pool<Sqlite>,
        bus: Arc<EventBus>,
        state: Arc<ServiceState>,
        liveness: Arc<LivenessWatch>,
    ) -> Result<Self> {
        let mut volumes = VolumeTable::new(&config);
        for (stream, device, index) in settings::load_all_stream_volumes(&db).await? {
            volumes.stream_mut(stream).load_index(index, device);
        }

        let mut groups = builtin_groups(&config);
        let group_names: Vec<&str> = ["media", "call", "alarms", "notifications"].to_vec();
        for (name, device, index) in settings::load_group_volumes(&db, &group_names).await? {
            if let Some(group) = groups.get_mut(&name) {
                group.load_index(index, device);
            }
        }

        let ringer_mode = settings::load_ringer_mode(&db).await?;
        state.set_ringer_modes(ringer_mode, ringer_mode);

        let mut guard = SafeVolumeGuard::new(config.safe_media_index);
        let (persisted_state, music_ms) = settings::load_safe_volume_state(&db).await?;
        guard.restore(persisted_state, music_ms);
        guard.on_regional_config(config.safe_volume_enforced, config.region.clone());
        guard.derive_usb_safe_index(backend.as_ref(), &config.range(AudioStream::Music));
        state.set_safe_volume_active(guard.is_active());

        for device in &config.fixed_volume_devices {
            state.set_device_behavior(*device, DeviceVolumeBehavior::Fixed);
        }
        for device in &config.full_volume_devices {
            state.set_device_behavior(*device, DeviceVolumeBehavior::Full);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = EngineHandle { tx };

        let mut queue = CommandQueue::new();
        // Cold boot uses the restart replay path to push everything native
        queue.push(Command::NativeRestarted);
        queue.push_delayed(
            Command::SafeVolumeCheck,
            Instant::now() + Duration::from_millis(SAFE_VOLUME_CHECK_INTERVAL_MS),
        );

        info!(ringer_mode = ?ringer_mode, guard = ?guard.state(), "engine state restored");

        Ok(Self {
            config,
            volumes: Arc::new(RwLock::new(volumes)),
            groups,
            guard,
            arbiter: ModeArbiter::new(),
            current_mode: AudioMode::Normal,
            current_owner_pid: None,
            ringer_mode,
            ringer_mode_external: ringer_mode,
            zen: ZenMode::Off,
            zen_policy: ZenPolicy::default(),
            affected_override: None,
            call_path_active: false,
            ringer_routed_to_call: false,
            active_device: DeviceType::Speaker,
            backend,
            db,
            bus,
            state,
            liveness,
            queue,
            rx,
            handle,
            shutting_down: false,
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Shared volume table for boundary read access
    pub fn volumes(&self) -> Arc<RwLock<VolumeTable>> {
        Arc::clone(&self.volumes)
    }

    /// Engine loop: drain posted commands into the merge queue, execute
    /// one at a time, and sleep until the next delayed deadline when idle.
    pub async fn run(mut self) {
        info!("volume engine started");
        loop {
            while let Ok(cmd) = self.rx.try_recv() {
                self.queue.push(cmd);
            }
            self.queue.promote_due(Instant::now());

            if let Some(cmd) = self.queue.pop() {
                if let Err(e) = self.dispatch(cmd).await {
                    error!(error = %e, "command execution failed");
                }
                if self.shutting_down && self.queue.is_empty() {
                    break;
                }
                continue;
            }

            if self.shutting_down {
                break;
            }

            let next_due = self.queue.next_due();
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.queue.push(cmd),
                    None => break,
                },
                _ = async {
                    match next_due {
                        Some(due) => {
                            tokio::time::sleep_until(tokio::time::Instant::from_std(due)).await
                        }
                        None => std::future::pending().await,
                    }
                } => {}
            }
        }
        info!("volume engine stopped");
    }

    pub(crate) async fn dispatch(&mut self, cmd: Command) -> Result<()> {
        match cmd {
            Command::SetStreamVolume {
                stream,
                device,
                index,
                privileged,
                flags,
            } => self.handle_set_stream_volume(stream, device, index, privileged, flags),
            Command::AdjustStreamVolume {
                stream,
                device,
                direction,
                privileged,
                flags,
            } => self.handle_adjust_stream_volume(stream, device, direction, privileged, flags),
            Command::SetStreamMute { stream, muted } => self.handle_set_stream_mute(stream, muted),
            Command::SetGroupVolume {
                group,
                device,
                index,
            } => self.handle_set_group_volume(&group, device, index),
            Command::SetRingerMode { mode, external } => {
                self.handle_set_ringer_mode(mode, external)
            }
            Command::SetZenMode { zen } => self.handle_set_zen_mode(zen),
            Command::SetZenPolicy { policy } => self.handle_set_zen_policy(policy),
            Command::SetRingerAffectedStreams { streams } => {
                self.handle_set_ringer_affected_streams(streams)
            }
            Command::SetMode {
                client,
                mode,
                privileged,
            } => self.handle_set_mode(client, mode, privileged),
            Command::SetClientActivity {
                client,
                playback,
                recording,
            } => self.handle_set_client_activity(client, playback, recording),
            Command::VerifyModeClient { client } => self.handle_verify_mode_client(client),
            Command::ClientDisconnected { client } => self.handle_client_disconnected(client),
            Command::SetDeviceVolumeBehavior { device, behavior } => {
                self.handle_set_device_volume_behavior(device, behavior)
            }
            Command::SetActiveDevice { device } => self.handle_set_active_device(device),
            Command::SetCallPathActive { active } => self.handle_set_call_path_active(active),
            Command::SetSafeVolumeEnabled { enabled } => {
                self.handle_set_safe_volume_enabled(enabled)
            }
            Command::SafeVolumeCheck => self.handle_safe_volume_check(),
            Command::PersistStreamVolume { stream, device } => {
                self.persist_stream_volume(stream, device).await
            }
            Command::PersistGroupVolume { group, device } => {
                self.persist_group_volume(&group, device).await
            }
            Command::PersistRingerMode => {
                settings::save_ringer_mode(&self.db, self.ringer_mode).await
            }
            Command::PersistSafeVolumeState => {
                settings::save_safe_volume_state(
                    &self.db,
                    self.guard.state().as_setting(),
                    self.guard.music_active_ms(),
                )
                .await
            }
            Command::NativeRestarted => self.handle_native_restarted(),
            Command::RetryNativeApply { stream, device } => {
                self.handle_retry_native_apply(stream, device)
            }
            Command::Shutdown => {
                info!("shutdown requested, flushing pending persistence");
                self.shutting_down = true;
                self.queue.promote_all();
                Ok(())
            }
        }
    }

    async fn persist_stream_volume(&self, stream: AudioStream, device: DeviceType) -> Result<()> {
        let index = self.volumes.read().unwrap().stream(stream).index(device);
        settings::save_stream_volume(&self.db, stream, device, index).await
    }

    async fn persist_group_volume(&self, group: &str, device: DeviceType) -> Result<()> {
        if let Some(state) = self.groups.get(group) {
            settings::save_group_volume(&self.db, group, device, state.index(device)).await?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::serializer::Command;
    use audiod_common::config::ui_to_index;
    use audiod_common::types::VolumeFlags;

    #[tokio::test]
    async fn test_media_volume_persists_across_restart() {
        let db = memory_db().await;
        let mut fx = engine_fixture_on(db.clone()).await;

        // UI 5 -> 6 on the media stream stores index 60
        fx.engine
            .dispatch(Command::SetStreamVolume {
                stream: AudioStream::Music,
                device: DeviceType::Speaker,
                index: ui_to_index(6),
                privileged: false,
                flags: VolumeFlags::default(),
            })
            .await
            .unwrap();
        assert_eq!(
            fx.engine
                .volumes
                .read()
                .unwrap()
                .stream(AudioStream::Music)
                .index(DeviceType::Speaker),
            60
        );

        // Flush the debounced persist write
        fx.engine
            .dispatch(Command::PersistStreamVolume {
                stream: AudioStream::Music,
                device: DeviceType::Speaker,
            })
            .await
            .unwrap();

        // A fresh engine on the same database restores the index
        let fx2 = engine_fixture_on(db).await;
        assert_eq!(
            fx2.engine
                .volumes
                .read()
                .unwrap()
                .stream(AudioStream::Music)
                .index(DeviceType::Speaker),
            60
        );
    }

    #[tokio::test]
    async fn test_shutdown_flushes_delayed_persistence() {
        let db = memory_db().await;
        let mut fx = engine_fixture_on(db.clone()).await;

        fx.engine
            .dispatch(Command::SetStreamVolume {
                stream: AudioStream::Ring,
                device: DeviceType::Speaker,
                index: 30,
                privileged: false,
                flags: VolumeFlags::default(),
            })
            .await
            .unwrap();
        assert!(fx.engine.queue.delayed_len() > 0);

        fx.engine.dispatch(Command::Shutdown).await.unwrap();
        // Shutdown promoted the debounced persist; run it
        while let Some(cmd) = fx.engine.queue.pop() {
            fx.engine.dispatch(cmd).await.unwrap();
        }

        let saved = crate::db::settings::load_stream_volume(
            &db,
            AudioStream::Ring,
            DeviceType::Speaker,
        )
        .await
        .unwrap();
        assert_eq!(saved, Some(30));
    }

    #[tokio::test]
    async fn test_startup_arms_safe_volume_poll() {
        let fx = engine_fixture().await;
        assert!(fx.engine.queue.delayed_len() >= 1);
    }
}
