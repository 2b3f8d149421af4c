//! Database access layer
//!
//! SQLite-backed persistence for volume indices, ringer mode and the safe
//! volume guard, all through a single key-value settings table.

pub mod init;
pub mod settings;

pub use init::init_database;
