//! Client liveness tracking
//!
//! Each registered client gets a death token; when the transport reports
//! the client gone, every cleanup registered under that token runs once.
//! Cleanups post commands to the engine, so teardown goes through the
//! same serialized path as live requests.

use audiod_common::types::ClientId;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Registry of per-client death cleanups
#[derive(Default)]
pub struct LivenessWatch {
    cleanups: Mutex<HashMap<Uuid, Vec<Cleanup>>>,
}

impl LivenessWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup to run when `client` dies
    pub fn register(&self, client: ClientId, cleanup: impl FnOnce() + Send + 'static) {
        let mut cleanups = self.cleanups.lock().unwrap();
        cleanups
            .entry(client.token)
            .or_default()
            .push(Box::new(cleanup));
    }

    /// Run and drop all cleanups for a dead client
    pub fn client_died(&self, client: ClientId) {
        let entries = self.cleanups.lock().unwrap().remove(&client.token);
        if let Some(entries) = entries {
            debug!(%client, count = entries.len(), "running death cleanups");
            for cleanup in entries {
                cleanup();
            }
        }
    }

    /// Drop cleanups without running them (orderly unregister)
    pub fn forget(&self, client: ClientId) {
        self.cleanups.lock().unwrap().remove(&client.token);
    }

    pub fn watched_count(&self) -> usize {
        self.cleanups.lock().unwrap().len()
    }
}
