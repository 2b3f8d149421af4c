//! Common types for the audiod services
//!
//! Shared across the audiod workspace: logical stream and device
//! enumerations, the platform volume configuration tables, the event bus
//! used for change notifications, and common error types.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::{PlatformConfiguration, StreamRange};
pub use error::{Error, Result};
pub use events::{AudioEvent, EventBus};
pub use types::{
    AudioMode, AudioStream, ClientId, DeviceType, DeviceVolumeBehavior, RingerMode, StreamSet,
    VolumeDirection, VolumeFlags, ZenMode, ZenPolicy,
};
