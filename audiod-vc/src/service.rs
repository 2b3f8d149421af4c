//! Service boundary
//!
//! [`AudioService`] is what the transport layer calls. Permission and
//! argument validation happen synchronously here, before anything is
//! enqueued; accepted requests become commands for the engine task.
//! Getters read the shared volume table and the engine's published state
//! snapshot directly.

use crate::engine::EngineHandle;
use crate::error::{Error, Result};
use crate::liveness::LivenessWatch;
use crate::serializer::Command;
use crate::state::ServiceState;
use crate::volume::VolumeTable;
use audiod_common::config::{index_to_ui, ui_to_index, PlatformConfiguration};
use audiod_common::events::{AudioEvent, EventBus};
use audiod_common::types::{
    AudioMode, AudioStream, ClientId, DeviceType, DeviceVolumeBehavior, RingerMode, StreamSet,
    VolumeDirection, VolumeFlags, ZenMode, ZenPolicy,
};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

/// Names of the attribute-addressed volume groups
pub const VOLUME_GROUPS: [&str; 4] = ["media", "call", "alarms", "notifications"];

pub struct AudioService {
    config: Arc<PlatformConfiguration>,
    volumes: Arc<RwLock<VolumeTable>>,
    engine: EngineHandle,
    state: Arc<ServiceState>,
    bus: Arc<EventBus>,
    liveness: Arc<LivenessWatch>,
}

impl AudioService {
    pub fn new(
        config: Arc<PlatformConfiguration>,
        volumes: Arc<RwLock<VolumeTable>>,
        engine: EngineHandle,
        state: Arc<ServiceState>,
        bus: Arc<EventBus>,
        liveness: Arc<LivenessWatch>,
    ) -> Self {
        Self {
            config,
            volumes,
            engine,
            state,
            bus,
            liveness,
        }
    }

    /// Register a connecting client; its mode request and timers are torn
    /// down through the engine when the transport reports it dead.
    pub fn register_client(&self, pid: i32) -> ClientId {
        let client = ClientId::new(pid);
        let engine = self.engine.clone();
        self.liveness.register(client, move || {
            engine.post(Command::ClientDisconnected { client });
        });
        debug!(%client, "client registered");
        client
    }

    /// Transport-reported client death
    pub fn client_died(&self, client: ClientId) {
        self.liveness.client_died(client);
    }

    /// Orderly disconnect
    pub fn client_disconnected(&self, client: ClientId) {
        self.liveness.forget(client);
        self.engine.post(Command::ClientDisconnected { client });
    }

    pub fn set_stream_volume(
        &self,
        stream: AudioStream,
        device: DeviceType,
        index: i32,
        privileged: bool,
        flags: VolumeFlags,
    ) -> Result<()> {
        self.validate_index(stream, index)?;
        self.engine.post(Command::SetStreamVolume {
            stream,
            device,
            index,
            privileged,
            flags,
        });
        Ok(())
    }

    /// UI-unit convenience wrapper
    pub fn set_stream_volume_ui(
        &self,
        stream: AudioStream,
        device: DeviceType,
        ui_index: i32,
        privileged: bool,
        flags: VolumeFlags,
    ) -> Result<()> {
        self.set_stream_volume(stream, device, ui_to_index(ui_index), privileged, flags)
    }

    pub fn adjust_stream_volume(
        &self,
        stream: AudioStream,
        device: DeviceType,
        direction: VolumeDirection,
        privileged: bool,
        flags: VolumeFlags,
    ) -> Result<()> {
        self.engine.post(Command::AdjustStreamVolume {
            stream,
            device,
            direction,
            privileged,
            flags,
        });
        Ok(())
    }

    pub fn set_stream_mute(&self, stream: AudioStream, muted: bool) -> Result<()> {
        self.engine.post(Command::SetStreamMute { stream, muted });
        Ok(())
    }

    pub fn set_group_volume(&self, group: &str, device: DeviceType, index: i32) -> Result<()> {
        if !VOLUME_GROUPS.contains(&group) {
            return Err(Error::InvalidInput(format!("unknown volume group '{}'", group)));
        }
        self.engine.post(Command::SetGroupVolume {
            group: group.to_string(),
            device,
            index,
        });
        Ok(())
    }

    pub fn set_mode(&self, client: ClientId, mode: AudioMode, privileged: bool) -> Result<()> {
        // Telephony modes are reserved for privileged callers
        if !privileged && matches!(mode, AudioMode::InCall | AudioMode::CallScreening) {
            return Err(Error::PermissionDenied(format!(
                "mode {:?} requires a privileged caller",
                mode
            )));
        }
        self.engine.post(Command::SetMode {
            client,
            mode,
            privileged,
        });
        Ok(())
    }

    pub fn abandon_mode(&self, client: ClientId) {
        self.engine.post(Command::SetMode {
            client,
            mode: AudioMode::Normal,
            privileged: true,
        });
    }

    pub fn set_client_activity(&self, client: ClientId, playback: bool, recording: bool) {
        self.engine.post(Command::SetClientActivity {
            client,
            playback,
            recording,
        });
    }

    pub fn set_ringer_mode_external(&self, mode: RingerMode) -> Result<()> {
        self.engine.post(Command::SetRingerMode {
            mode,
            external: true,
        });
        Ok(())
    }

    pub fn set_ringer_mode_internal(&self, mode: RingerMode, privileged: bool) -> Result<()> {
        self.require_privileged(privileged, "set_ringer_mode_internal")?;
        self.engine.post(Command::SetRingerMode {
            mode,
            external: false,
        });
        Ok(())
    }

    pub fn set_zen_mode(&self, zen: ZenMode) -> Result<()> {
        self.engine.post(Command::SetZenMode { zen });
        Ok(())
    }

    pub fn set_zen_policy(&self, policy: ZenPolicy) -> Result<()> {
        self.engine.post(Command::SetZenPolicy { policy });
        Ok(())
    }

    /// Install (or with `None` clear) a wholesale override of the
    /// ringer-affected stream set
    pub fn set_ringer_affected_streams(
        &self,
        streams: Option<StreamSet>,
        privileged: bool,
    ) -> Result<()> {
        self.require_privileged(privileged, "set_ringer_affected_streams")?;
        self.engine.post(Command::SetRingerAffectedStreams { streams });
        Ok(())
    }

    pub fn set_device_volume_behavior(
        &self,
        device: DeviceType,
        behavior: DeviceVolumeBehavior,
        privileged: bool,
    ) -> Result<()> {
        self.require_privileged(privileged, "set_device_volume_behavior")?;
        self.engine
            .post(Command::SetDeviceVolumeBehavior { device, behavior });
        Ok(())
    }

    pub fn set_active_device(&self, device: DeviceType, privileged: bool) -> Result<()> {
        self.require_privileged(privileged, "set_active_device")?;
        self.engine.post(Command::SetActiveDevice { device });
        Ok(())
    }

    pub fn set_call_path_active(&self, active: bool, privileged: bool) -> Result<()> {
        self.require_privileged(privileged, "set_call_path_active")?;
        self.engine.post(Command::SetCallPathActive { active });
        Ok(())
    }

    pub fn set_safe_volume_enabled(&self, enabled: bool, privileged: bool) -> Result<()> {
        self.require_privileged(privileged, "set_safe_volume_enabled")?;
        self.engine.post(Command::SetSafeVolumeEnabled { enabled });
        Ok(())
    }

    // Read-only getters; alias resolution and index lookup happen under
    // one read lock so the pair is consistent.

    pub fn stream_volume(&self, stream: AudioStream, device: DeviceType) -> i32 {
        let volumes = self.volumes.read().unwrap();
        let target = volumes.alias_of(stream);
        volumes.stream(target).index(device)
    }

    pub fn stream_volume_ui(&self, stream: AudioStream, device: DeviceType) -> i32 {
        index_to_ui(self.stream_volume(stream, device))
    }

    pub fn stream_min_volume(&self, stream: AudioStream) -> i32 {
        self.config.range(stream).min
    }

    pub fn stream_max_volume(&self, stream: AudioStream) -> i32 {
        self.config.range(stream).max
    }

    pub fn is_stream_mute(&self, stream: AudioStream) -> bool {
        let volumes = self.volumes.read().unwrap();
        let target = volumes.alias_of(stream);
        volumes.stream(target).is_fully_muted()
    }

    pub fn ringer_mode(&self) -> RingerMode {
        self.state.ringer_mode_external()
    }

    pub fn ringer_mode_internal(&self) -> RingerMode {
        self.state.ringer_mode()
    }

    pub fn mode(&self) -> AudioMode {
        self.state.mode()
    }

    pub fn zen_mode(&self) -> ZenMode {
        self.state.zen()
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<AudioEvent> {
        self.bus.subscribe()
    }

    fn validate_index(&self, stream: AudioStream, index: i32) -> Result<()> {
        let range = self.config.range(stream);
        if index < range.min || index > range.max {
            return Err(Error::InvalidInput(format!(
                "index {} outside [{}, {}] for stream {}",
                index, range.min, range.max, stream
            )));
        }
        Ok(())
    }

    fn require_privileged(&self, privileged: bool, op: &str) -> Result<()> {
        if privileged {
            Ok(())
        } else {
            Err(Error::PermissionDenied(format!(
                "{} requires a privileged caller",
                op
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::VolumeEngine;
    use crate::native::testing::RecordingBackend;
    use crate::native::AudioBackend;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::time::Duration;

    async fn service_with_engine() -> (AudioService, tokio::task::JoinHandle<()>) {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_database(&db).await.unwrap();

        let config = Arc::new(PlatformConfiguration::builtin());
        let backend = Arc::new(RecordingBackend::new()) as Arc<dyn AudioBackend>;
        let bus = Arc::new(EventBus::new(100));
        let state = Arc::new(ServiceState::new());
        let liveness = Arc::new(LivenessWatch::new());

        let engine = VolumeEngine::new(
            Arc::clone(&config),
            backend,
            db,
            Arc::clone(&bus),
            Arc::clone(&state),
            Arc::clone(&liveness),
        )
        .await
        .unwrap();

        let service = AudioService::new(
            config,
            engine.volumes(),
            engine.handle(),
            state,
            bus,
            liveness,
        );
        let task = tokio::spawn(engine.run());
        (service, task)
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_volume_write_reaches_engine() {
        let (service, _task) = service_with_engine().await;

        service
            .set_stream_volume_ui(
                AudioStream::Music,
                DeviceType::Speaker,
                6,
                false,
                VolumeFlags::default(),
            )
            .unwrap();

        wait_for(|| service.stream_volume(AudioStream::Music, DeviceType::Speaker) == 60).await;
        assert_eq!(service.stream_volume_ui(AudioStream::Music, DeviceType::Speaker), 6);
    }

    #[tokio::test]
    async fn test_out_of_range_index_rejected_synchronously() {
        let (service, _task) = service_with_engine().await;
        let err = service
            .set_stream_volume(
                AudioStream::Music,
                DeviceType::Speaker,
                9999,
                false,
                VolumeFlags::default(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_privileged_ops_rejected_for_unprivileged() {
        let (service, _task) = service_with_engine().await;
        assert!(matches!(
            service.set_ringer_mode_internal(RingerMode::Silent, false),
            Err(Error::PermissionDenied(_))
        ));
        assert!(matches!(
            service.set_safe_volume_enabled(false, false),
            Err(Error::PermissionDenied(_))
        ));
        let client = service.register_client(42);
        assert!(matches!(
            service.set_mode(client, AudioMode::InCall, false),
            Err(Error::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_group_rejected() {
        let (service, _task) = service_with_engine().await;
        assert!(matches!(
            service.set_group_volume("spatial", DeviceType::Speaker, 50),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_client_death_releases_mode() {
        let (service, _task) = service_with_engine().await;
        let client = service.register_client(77);

        service.set_mode(client, AudioMode::Ringtone, true).unwrap();
        wait_for(|| service.mode() == AudioMode::Ringtone).await;

        service.client_died(client);
        wait_for(|| service.mode() == AudioMode::Normal).await;
    }

    #[tokio::test]
    async fn test_getter_resolves_alias() {
        let (service, _task) = service_with_engine().await;
        service
            .set_stream_volume(
                AudioStream::Ring,
                DeviceType::Speaker,
                30,
                false,
                VolumeFlags::default(),
            )
            .unwrap();
        wait_for(|| service.stream_volume(AudioStream::Ring, DeviceType::Speaker) == 30).await;
        // Notification reads through its alias to Ring
        assert_eq!(
            service.stream_volume(AudioStream::Notification, DeviceType::Speaker),
            30
        );
    }
}
