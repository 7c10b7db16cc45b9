//! Connection Registry
//!
//! Process-wide table of live client connections. Each entry owns the
//! connection's upstream link and its background tasks, so tearing an entry
//! down is all that is needed to release a connection.

use super::upstream::UpstreamLink;
use std::{collections::HashMap, sync::Arc};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

struct Entry {
    link: Arc<UpstreamLink>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<Uuid, Entry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: Uuid, link: Arc<UpstreamLink>) {
        let mut connections = self.connections.lock().await;
        connections.insert(
            id,
            Entry {
                link,
                tasks: Vec::new(),
            },
        );
        info!(connection_id = %id, active = connections.len(), "Connection registered");
    }

    /// Ties a background task to a connection. A task offered for an unknown
    /// connection is aborted immediately and `false` is returned.
    pub async fn add_task(&self, id: Uuid, task: JoinHandle<()>) -> bool {
        match self.connections.lock().await.get_mut(&id) {
            Some(entry) => {
                entry.tasks.push(task);
                true
            }
            None => {
                warn!(connection_id = %id, "Task offered for unknown connection; aborting it");
                task.abort();
                false
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.connections.lock().await.contains_key(&id)
    }

    /// Removes a connection, cancels its tasks and waits for them to stop,
    /// then disconnects its upstream link.
    ///
    /// Returns `false` when the connection was already torn down.
    pub async fn teardown(&self, id: Uuid) -> bool {
        let Some(entry) = self.connections.lock().await.remove(&id) else {
            debug!(connection_id = %id, "Connection already torn down");
            return false;
        };

        for task in entry.tasks {
            task.abort();
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(connection_id = %id, error = %e, "Connection task panicked");
                }
            }
        }
        entry.link.disconnect().await;

        info!(connection_id = %id, "Connection torn down");
        true
    }
}
