//! Attribute-addressed volume groups
//!
//! The newer client model addresses volume by attribute-resolved group
//! rather than by legacy stream. A group is usually bridged to one legacy
//! stream so both models stay in sync; bridged writes compare against the
//! legacy stream's already-applied value before touching the native
//! engine, avoiding duplicate applies. Unbridged groups carry their own
//! attribute-derived bounds.

use audiod_common::config::StreamRange;
use audiod_common::types::{AudioStream, DeviceType};
use std::collections::HashMap;

/// Volume state for one attribute-addressed group
#[derive(Debug, Clone)]
pub struct VolumeGroupState {
    name: String,
    /// Legacy stream this group mirrors, if any
    bridged: Option<AudioStream>,
    range: StreamRange,
    indices: HashMap<DeviceType, i32>,
}

impl VolumeGroupState {
    /// Group bridged to a legacy stream; bounds come from that stream
    pub fn bridged(name: impl Into<String>, stream: AudioStream, range: StreamRange) -> Self {
        Self::with_range(name, Some(stream), range)
    }

    /// Unbridged group with attribute-derived bounds
    pub fn unbridged(name: impl Into<String>, range: StreamRange) -> Self {
        Self::with_range(name, None, range)
    }

    fn with_range(name: impl Into<String>, bridged: Option<AudioStream>, range: StreamRange) -> Self {
        let mut indices = HashMap::new();
        indices.insert(
            DeviceType::Default,
            range.default.clamp(range.min, range.max),
        );
        Self {
            name: name.into(),
            bridged,
            range,
            indices,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bridged_stream(&self) -> Option<AudioStream> {
        self.bridged
    }

    pub fn range(&self) -> StreamRange {
        self.range
    }

    /// Stored index for a device, falling back to the default entry
    pub fn index(&self, device: DeviceType) -> i32 {
        match self.indices.get(&device) {
            Some(index) => *index,
            None => self.indices[&DeviceType::Default],
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (DeviceType, i32)> + '_ {
        self.indices.iter().map(|(d, i)| (*d, *i))
    }

    /// Store a clamped index; returns whether it changed
    pub fn set_index(&mut self, index: i32, device: DeviceType) -> bool {
        let clamped = index.clamp(self.range.min, self.range.max);
        let old = self.index(device);
        self.indices.insert(device, clamped);
        clamped != old
    }

    /// Restore a persisted index
    pub fn load_index(&mut self, index: i32, device: DeviceType) {
        self.indices
            .insert(device, index.clamp(self.range.min, self.range.max));
    }
}
