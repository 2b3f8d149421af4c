//! Volume coordination engine
//!
//! One tokio task owns all mutable coordination state and executes posted
//! commands strictly one at a time. The `impl VolumeEngine` blocks are
//! split by concern:
//!
//! - `core` — engine construction, run loop, command dispatch
//! - `volume_ops` — stream/group volume and mute handling
//! - `ringer_ops` — ringer mode, zen, internal mute recomputation
//! - `mode_ops` — mode request handling and ownership resolution
//! - `safety_ops` — safe volume guard driving and cap enforcement
//! - `recovery` — native restart replay and apply retries

mod core;
mod mode_ops;
mod recovery;
mod ringer_ops;
mod safety_ops;
mod volume_ops;

pub use self::core::{EngineHandle, VolumeEngine};
