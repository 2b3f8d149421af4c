//! Stream and group volume state
//!
//! [`VolumeTable`] holds every stream's state plus the active alias table
//! behind one `std::sync::RwLock`: the engine task is the only writer, and
//! boundary getters take short-lived read locks for cross-stream atomic
//! reads (alias resolution plus index lookup).

pub mod group;
pub mod stream;

pub use group::VolumeGroupState;
pub use stream::{rescale_index, StreamVolumeState};

use audiod_common::config::PlatformConfiguration;
use audiod_common::types::AudioStream;
use std::collections::HashMap;

/// All per-stream volume state plus the active alias table
pub struct VolumeTable {
    streams: HashMap<AudioStream, StreamVolumeState>,
    aliases: HashMap<AudioStream, AudioStream>,
}

impl VolumeTable {
    /// Build from configured bounds; indices start at platform defaults
    /// until persisted values are loaded over them.
    pub fn new(config: &PlatformConfiguration) -> Self {
        let mut streams = HashMap::new();
        for stream in AudioStream::ALL {
            streams.insert(stream, StreamVolumeState::new(stream, config.range(stream)));
        }
        Self {
            streams,
            aliases: config.aliases.clone(),
        }
    }

    pub fn stream(&self, stream: AudioStream) -> &StreamVolumeState {
        &self.streams[&stream]
    }

    pub fn stream_mut(&mut self, stream: AudioStream) -> &mut StreamVolumeState {
        self.streams.get_mut(&stream).expect("all streams present")
    }

    /// Representative stream under the active alias table
    pub fn alias_of(&self, stream: AudioStream) -> AudioStream {
        self.aliases.get(&stream).copied().unwrap_or(stream)
    }

    /// Streams whose alias resolves to `target`, including itself
    pub fn aliased_to(&self, target: AudioStream) -> Vec<AudioStream> {
        AudioStream::ALL
            .iter()
            .copied()
            .filter(|s| self.alias_of(*s) == target)
            .collect()
    }

    /// Replace the alias table wholesale (already validated)
    pub fn set_aliases(&mut self, aliases: HashMap<AudioStream, AudioStream>) {
        self.aliases = aliases;
    }
}
