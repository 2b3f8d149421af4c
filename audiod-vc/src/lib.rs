//! audiod-vc — volume & mode coordination service
//!
//! Central coordinator for per-stream/per-device output volume, ringer
//! and interruption-filter muting, hearing-safety capping, and audio-mode
//! ownership arbitration. All mutations are serialized through a single
//! engine task; the [`service::AudioService`] boundary validates requests
//! synchronously and posts them as commands.

pub mod db;
pub mod engine;
pub mod error;
pub mod liveness;
pub mod mode;
pub mod native;
pub mod ringer;
pub mod safety;
pub mod serializer;
pub mod service;
pub mod state;
pub mod volume;

pub use engine::{EngineHandle, VolumeEngine};
pub use error::{Error, Result};
pub use service::AudioService;
