//! Native audio engine boundary
//!
//! The engine applies resolved state to the native renderer through this
//! trait. Calls are bounded and synchronous; a failure is recoverable and
//! is retried by the engine with a fixed delay. The value to apply is
//! always snapshotted before the call, so an apply never holds the volume
//! table lock.

use crate::error::{Error, Result};
use audiod_common::types::{AudioMode, AudioStream, DeviceType};
use tracing::debug;

/// Outbound calls into the native audio engine
pub trait AudioBackend: Send + Sync {
    /// Push a stream's UI-unit volume range
    fn init_stream_range(&self, stream: AudioStream, min_ui: i32, max_ui: i32) -> Result<()>;

    /// Apply a stream's UI-unit index for one device
    fn set_stream_index(&self, stream: AudioStream, ui_index: i32, device: DeviceType)
        -> Result<()>;

    /// Apply the resolved system audio mode
    fn set_mode(&self, mode: AudioMode) -> Result<()>;

    /// Output level in dBFS for a stream at a UI index on a device
    ///
    /// Used by the safe volume guard to derive the USB headset safe index
    /// by binary search against a target level.
    fn stream_volume_db(&self, stream: AudioStream, ui_index: i32, device: DeviceType) -> f32;

    /// Whether the stream is currently rendering
    fn is_stream_active(&self, stream: AudioStream) -> bool;
}

/// Stand-in backend that logs every apply call
///
/// Used by the daemon binary until a real engine client is wired in, and
/// as the no-op default in examples.
pub struct LoggingBackend;

impl AudioBackend for LoggingBackend {
    fn init_stream_range(&self, stream: AudioStream, min_ui: i32, max_ui: i32) -> Result<()> {
        debug!(%stream, min_ui, max_ui, "native init range");
        Ok(())
    }

    fn set_stream_index(
        &self,
        stream: AudioStream,
        ui_index: i32,
        device: DeviceType,
    ) -> Result<()> {
        debug!(%stream, ui_index, %device, "native apply index");
        Ok(())
    }

    fn set_mode(&self, mode: AudioMode) -> Result<()> {
        debug!(?mode, "native set mode");
        Ok(())
    }

    fn stream_volume_db(&self, _stream: AudioStream, ui_index: i32, _device: DeviceType) -> f32 {
        linear_db_curve(ui_index)
    }

    fn is_stream_active(&self, _stream: AudioStream) -> bool {
        false
    }
}

/// Simple linear-in-dB attenuation model: 0 dBFS at UI 15, -75 dBFS at 0
pub(crate) fn linear_db_curve(ui_index: i32) -> f32 {
    -75.0 + 5.0 * ui_index.clamp(0, 15) as f32
}

#[cfg(test)]
pub mod testing {
    //! Recording backend used by engine tests

    use super::*;
    use audiod_common::types::{AudioMode, AudioStream, DeviceType};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub struct AppliedIndex {
        pub stream: AudioStream,
        pub ui_index: i32,
        pub device: DeviceType,
    }

    /// Backend that records every call; can be told to fail applies and to
    /// report media as active.
    #[derive(Default)]
    pub struct RecordingBackend {
        pub applied: Mutex<Vec<AppliedIndex>>,
        pub modes: Mutex<Vec<AudioMode>>,
        pub ranges: Mutex<Vec<(AudioStream, i32, i32)>>,
        pub fail_applies: AtomicBool,
        pub music_active: AtomicBool,
    }

    impl RecordingBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail_applies(&self, fail: bool) {
            self.fail_applies.store(fail, Ordering::SeqCst);
        }

        pub fn set_music_active(&self, active: bool) {
            self.music_active.store(active, Ordering::SeqCst);
        }

        pub fn last_applied(&self, stream: AudioStream, device: DeviceType) -> Option<i32> {
            self.applied
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|a| a.stream == stream && a.device == device)
                .map(|a| a.ui_index)
        }

        pub fn clear(&self) {
            self.applied.lock().unwrap().clear();
            self.modes.lock().unwrap().clear();
            self.ranges.lock().unwrap().clear();
        }
    }

    impl AudioBackend for RecordingBackend {
        fn init_stream_range(&self, stream: AudioStream, min_ui: i32, max_ui: i32) -> Result<()> {
            if self.fail_applies.load(Ordering::SeqCst) {
                return Err(Error::Native("injected init failure".into()));
            }
            self.ranges.lock().unwrap().push((stream, min_ui, max_ui));
            Ok(())
        }

        fn set_stream_index(
            &self,
            stream: AudioStream,
            ui_index: i32,
            device: DeviceType,
        ) -> Result<()> {
            if self.fail_applies.load(Ordering::SeqCst) {
                return Err(Error::Native("injected apply failure".into()));
            }
            self.applied.lock().unwrap().push(AppliedIndex {
                stream,
                ui_index,
                device,
            });
            Ok(())
        }

        fn set_mode(&self, mode: AudioMode) -> Result<()> {
            self.modes.lock().unwrap().push(mode);
            Ok(())
        }

        fn stream_volume_db(&self, _stream: AudioStream, ui_index: i32, _device: DeviceType) -> f32 {
            linear_db_curve(ui_index)
        }

        fn is_stream_active(&self, stream: AudioStream) -> bool {
            stream == AudioStream::Music && self.music_active.load(Ordering::SeqCst)
        }
    }
}
