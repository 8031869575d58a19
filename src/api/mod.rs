//! Configuration and construction errors for the library's entry points.
mod options;
mod wiring;

pub use options::ClusteringOptions;
pub use options::LockingOptions;
pub use wiring::ClusteringConfig;
pub use wiring::ClusteringCreationError;
pub use wiring::LockingCreationError;

pub(crate) use options::ClusteringOptionsValidated;
pub(crate) use options::LockingOptionsValidated;
