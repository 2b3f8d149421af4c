//! Per-stream volume state
//!
//! One instance per logical stream: a sparse device-to-index map with a
//! distinguished default-device fallback entry, the stream's bounds, and
//! two independent mute gates. Indices are fixed-point x10 units.

use audiod_common::config::StreamRange;
use audiod_common::types::{AudioStream, DeviceType};
use std::collections::HashMap;
use tracing::warn;

/// Linear rescale of an index between two stream ranges
///
/// `dst = dst_min + round((index - src_min) * dst_span / src_span)`.
/// A zero-width source range maps to the destination minimum.
pub fn rescale_index(index: i32, src: &StreamRange, dst: &StreamRange) -> i32 {
    let src_span = src.max - src.min;
    if src_span <= 0 {
        warn!(
            src_min = src.min,
            src_max = src.max,
            "rescale with zero-width source range, returning destination minimum"
        );
        return dst.min;
    }
    let dst_span = dst.max - dst.min;
    let offset = (index - src.min).clamp(0, src_span);
    dst.min + (offset * dst_span + src_span / 2) / src_span
}

/// Volume state for one logical stream
#[derive(Debug, Clone)]
pub struct StreamVolumeState {
    stream: AudioStream,
    range: StreamRange,
    /// Sparse device map; the Default entry always exists
    indices: HashMap<DeviceType, i32>,
    muted: bool,
    muted_internally: bool,
}

impl StreamVolumeState {
    pub fn new(stream: AudioStream, range: StreamRange) -> Self {
        let mut indices = HashMap::new();
        indices.insert(
            DeviceType::Default,
            range.default.clamp(range.min, range.max),
        );
        Self {
            stream,
            range,
            indices,
            muted: false,
            muted_internally: false,
        }
    }

    pub fn stream(&self) -> AudioStream {
        self.stream
    }

    pub fn range(&self) -> StreamRange {
        self.range
    }

    pub fn min_index(&self) -> i32 {
        self.range.min
    }

    pub fn max_index(&self) -> i32 {
        self.range.max
    }

    /// Stored index for a device, falling back to the default-device
    /// entry; never errors.
    pub fn index(&self, device: DeviceType) -> i32 {
        match self.indices.get(&device) {
            Some(index) => *index,
            None => self.indices[&DeviceType::Default],
        }
    }

    pub fn has_device(&self, device: DeviceType) -> bool {
        self.indices.contains_key(&device)
    }

    /// All stored (device, index) entries
    pub fn entries(&self) -> impl Iterator<Item = (DeviceType, i32)> + '_ {
        self.indices.iter().map(|(d, i)| (*d, *i))
    }

    /// Clamp an index into the caller's permitted range
    pub fn clamp(&self, index: i32, privileged: bool) -> i32 {
        index.clamp(self.range.floor(privileged), self.range.max)
    }

    /// Store a clamped index for a device; returns whether it changed
    pub fn set_index(&mut self, index: i32, device: DeviceType, privileged: bool) -> bool {
        let clamped = self.clamp(index, privileged);
        let old = self.index(device);
        self.indices.insert(device, clamped);
        clamped != old
    }

    /// Restore a persisted index without the unprivileged floor
    pub fn load_index(&mut self, index: i32, device: DeviceType) {
        self.indices
            .insert(device, index.clamp(self.range.min, self.range.max));
    }

    /// Explicit (client-requested) mute gate; returns whether it changed
    pub fn set_muted(&mut self, muted: bool) -> bool {
        if self.muted == muted {
            return false;
        }
        self.muted = muted;
        true
    }

    /// Internal (ringer/zen-driven) mute gate; returns whether it changed
    pub fn set_muted_internally(&mut self, muted: bool) -> bool {
        if self.muted_internally == muted {
            return false;
        }
        self.muted_internally = muted;
        true
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_muted_internally(&self) -> bool {
        self.muted_internally
    }

    /// True when either mute gate is set
    pub fn is_fully_muted(&self) -> bool {
        self.muted || self.muted_internally
    }
}
