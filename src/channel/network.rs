use crate::channel::hub::{spawn_hub, HubClient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

const DEFAULT_FAILURE_DETECTION_INTERVAL: Duration = Duration::from_millis(100);

/// LocalNetwork is an in-process group transport. Every cluster name on a network gets its own
/// group; separate `LocalNetwork` values never see each other, so several independent clusters can
/// live in one process.
///
/// Hubs are spawned lazily on the current tokio runtime the first time a cluster name is used.
#[derive(Clone)]
pub struct LocalNetwork {
    logger: slog::Logger,
    failure_detection_interval: Duration,
    hubs: Arc<Mutex<HashMap<String, HubClient>>>,
}

impl LocalNetwork {
    pub fn new(logger: slog::Logger) -> Self {
        Self::with_failure_detection_interval(logger, DEFAULT_FAILURE_DETECTION_INTERVAL)
    }

    /// `interval` bounds how long a member that vanished without leaving stays in the view.
    pub fn with_failure_detection_interval(logger: slog::Logger, interval: Duration) -> Self {
        LocalNetwork {
            logger,
            failure_detection_interval: interval,
            hubs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn hub(&self, cluster_name: &str) -> HubClient {
        let mut hubs = self.hubs.lock().expect("LocalNetwork.hub() mutex guard poison");
        hubs.entry(cluster_name.to_string())
            .or_insert_with(|| {
                slog::debug!(self.logger, "Spawning group hub for cluster '{}'.", cluster_name);
                spawn_hub(
                    self.logger.clone(),
                    cluster_name.to_string(),
                    self.failure_detection_interval,
                )
            })
            .clone()
    }

    pub(crate) fn existing_hub(&self, cluster_name: &str) -> Option<HubClient> {
        self.hubs
            .lock()
            .expect("LocalNetwork.existing_hub() mutex guard poison")
            .get(cluster_name)
            .cloned()
    }
}
