use crate::api::options::ClusteringOptions;
use crate::channel::{ChannelError, TransportConfig};

pub struct ClusteringConfig {
    /// Members with the same cluster name on the same transport form one group.
    pub cluster_name: String,
    pub transport: TransportConfig,
    pub logger: slog::Logger,
    pub options: ClusteringOptions,
}

impl ClusteringConfig {
    pub fn new(cluster_name: impl Into<String>, transport: TransportConfig, logger: slog::Logger) -> Self {
        ClusteringConfig {
            cluster_name: cluster_name.into(),
            transport,
            logger,
            options: ClusteringOptions::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClusteringCreationError {
    #[error("Invalid cluster name '{0}'")]
    InvalidClusterName(String),
    #[error("Illegal options for configuring clustering: {0}")]
    IllegalOptions(String),
    #[error("Membership channel is not connected")]
    ChannelNotConnected,
    #[error("Failed to join the cluster")]
    Join(#[source] ChannelError),
}

#[derive(Debug, thiserror::Error)]
pub enum LockingCreationError {
    #[error("Illegal options for configuring locking: {0}")]
    IllegalOptions(String),
    #[error("A cluster locking service is already attached to this clustering service")]
    AlreadyAttached,
    #[error("Clustering service is shut down")]
    ClusteringClosed,
}
