//! Shared service state
//!
//! Snapshot of engine-owned state that boundary getters read without going
//! through the command queue. The engine task is the only writer; getters
//! take short-lived read locks, so a getter never observes a half-applied
//! command.

use audiod_common::types::{
    AudioMode, DeviceType, DeviceVolumeBehavior, RingerMode, ZenMode, ZenPolicy,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// State published by the engine for synchronous reads
pub struct ServiceState {
    /// Internal ringer mode (what the mute computation uses)
    ringer_mode: RwLock<RingerMode>,

    /// External ringer mode (what the UI shows; differs while vibrate is
    /// emulated for a device without a vibrator)
    ringer_mode_external: RwLock<RingerMode>,

    zen: RwLock<ZenMode>,
    zen_policy: RwLock<ZenPolicy>,

    /// Resolved audio mode and its owner's pid
    mode: RwLock<(AudioMode, Option<i32>)>,

    active_device: RwLock<DeviceType>,
    device_behaviors: RwLock<HashMap<DeviceType, DeviceVolumeBehavior>>,

    call_path_active: RwLock<bool>,
    ringer_routed_to_call: RwLock<bool>,
    safe_volume_active: RwLock<bool>,
}

impl ServiceState {
    pub fn new() -> Self {
        Self {
            ringer_mode: RwLock::new(RingerMode::Normal),
            ringer_mode_external: RwLock::new(RingerMode::Normal),
            zen: RwLock::new(ZenMode::Off),
            zen_policy: RwLock::new(ZenPolicy::default()),
            mode: RwLock::new((AudioMode::Normal, None)),
            active_device: RwLock::new(DeviceType::Speaker),
            device_behaviors: RwLock::new(HashMap::new()),
            call_path_active: RwLock::new(false),
            ringer_routed_to_call: RwLock::new(false),
            safe_volume_active: RwLock::new(false),
        }
    }

    pub fn ringer_mode(&self) -> RingerMode {
        *self.ringer_mode.read().unwrap()
    }

    pub fn ringer_mode_external(&self) -> RingerMode {
        *self.ringer_mode_external.read().unwrap()
    }

    pub fn set_ringer_modes(&self, internal: RingerMode, external: RingerMode) {
        *self.ringer_mode.write().unwrap() = internal;
        *self.ringer_mode_external.write().unwrap() = external;
    }

    pub fn zen(&self) -> ZenMode {
        *self.zen.read().unwrap()
    }

    pub fn set_zen(&self, zen: ZenMode) {
        *self.zen.write().unwrap() = zen;
    }

    pub fn zen_policy(&self) -> ZenPolicy {
        *self.zen_policy.read().unwrap()
    }

    pub fn set_zen_policy(&self, policy: ZenPolicy) {
        *self.zen_policy.write().unwrap() = policy;
    }

    pub fn mode(&self) -> AudioMode {
        self.mode.read().unwrap().0
    }

    pub fn mode_owner_pid(&self) -> Option<i32> {
        self.mode.read().unwrap().1
    }

    pub fn set_mode(&self, mode: AudioMode, owner_pid: Option<i32>) {
        *self.mode.write().unwrap() = (mode, owner_pid);
    }

    pub fn active_device(&self) -> DeviceType {
        *self.active_device.read().unwrap()
    }

    pub fn set_active_device(&self, device: DeviceType) {
        *self.active_device.write().unwrap() = device;
    }

    pub fn device_behavior(&self, device: DeviceType) -> DeviceVolumeBehavior {
        self.device_behaviors
            .read()
            .unwrap()
            .get(&device)
            .copied()
            .unwrap_or(DeviceVolumeBehavior::Variable)
    }

    pub fn set_device_behavior(&self, device: DeviceType, behavior: DeviceVolumeBehavior) {
        self.device_behaviors
            .write()
            .unwrap()
            .insert(device, behavior);
    }

    pub fn call_path_active(&self) -> bool {
        *self.call_path_active.read().unwrap()
    }

    pub fn set_call_path_active(&self, active: bool) {
        *self.call_path_active.write().unwrap() = active;
    }

    pub fn ringer_routed_to_call(&self) -> bool {
        *self.ringer_routed_to_call.read().unwrap()
    }

    pub fn set_ringer_routed_to_call(&self, routed: bool) {
        *self.ringer_routed_to_call.write().unwrap() = routed;
    }

    pub fn safe_volume_active(&self) -> bool {
        *self.safe_volume_active.read().unwrap()
    }

    pub fn set_safe_volume_active(&self, active: bool) {
        *self.safe_volume_active.write().unwrap() = active;
    }
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::new()
    }
}
