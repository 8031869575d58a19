use std::convert::TryFrom;
use tokio::time::Duration;

#[derive(Clone, Default)]
pub struct ClusteringOptions {
    /// Bound on connecting to the transport and being admitted to the group.
    pub join_timeout: Option<Duration>,
    /// Bound on announcing departure. Past it, the group's failure detection takes over.
    pub leave_timeout: Option<Duration>,
}

pub(crate) struct ClusteringOptionsValidated {
    pub join_timeout: Duration,
    pub leave_timeout: Duration,
}

impl ClusteringOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.join_timeout == Duration::from_millis(0) {
            return Err("Join timeout must be greater than zero");
        }
        if self.leave_timeout == Duration::from_millis(0) {
            return Err("Leave timeout must be greater than zero");
        }

        Ok(())
    }
}

impl TryFrom<ClusteringOptions> for ClusteringOptionsValidated {
    type Error = &'static str;

    fn try_from(options: ClusteringOptions) -> Result<Self, Self::Error> {
        let values = ClusteringOptionsValidated {
            join_timeout: options.join_timeout.unwrap_or(Duration::from_secs(10)),
            leave_timeout: options.leave_timeout.unwrap_or(Duration::from_secs(5)),
        };

        values.validate()?;
        Ok(values)
    }
}

#[derive(Clone, Default)]
pub struct LockingOptions {
    /// Bound used by `try_lock` calls that don't pass their own timeout.
    pub default_lock_timeout: Option<Duration>,
    /// How long `unlock` waits to observe its own release.
    pub release_timeout: Option<Duration>,
    /// Longest a contended attempt sleeps before retrying without having seen a release.
    pub contention_retry_interval: Option<Duration>,
}

#[derive(Clone)]
pub(crate) struct LockingOptionsValidated {
    pub default_lock_timeout: Duration,
    pub release_timeout: Duration,
    pub contention_retry_interval: Duration,
}

impl LockingOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.release_timeout == Duration::from_millis(0) {
            return Err("Release timeout must be greater than zero");
        }
        if self.contention_retry_interval == Duration::from_millis(0) {
            return Err("Contention retry interval must be greater than zero");
        }

        Ok(())
    }
}

impl TryFrom<LockingOptions> for LockingOptionsValidated {
    type Error = &'static str;

    fn try_from(options: LockingOptions) -> Result<Self, Self::Error> {
        let values = LockingOptionsValidated {
            default_lock_timeout: options.default_lock_timeout.unwrap_or(Duration::from_secs(10)),
            release_timeout: options.release_timeout.unwrap_or(Duration::from_secs(5)),
            contention_retry_interval: options
                .contention_retry_interval
                .unwrap_or(Duration::from_millis(50)),
        };

        values.validate()?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ClusteringOptionsValidated::try_from(ClusteringOptions::default()).is_ok());

        let locking = LockingOptionsValidated::try_from(LockingOptions::default()).unwrap();
        assert_eq!(locking.default_lock_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_durations_are_rejected() {
        let result = LockingOptionsValidated::try_from(LockingOptions {
            contention_retry_interval: Some(Duration::from_millis(0)),
            ..LockingOptions::default()
        });
        assert!(result.is_err());

        let result = ClusteringOptionsValidated::try_from(ClusteringOptions {
            join_timeout: Some(Duration::from_millis(0)),
            ..ClusteringOptions::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn zero_lock_timeout_means_single_attempt_and_is_allowed() {
        let result = LockingOptionsValidated::try_from(LockingOptions {
            default_lock_timeout: Some(Duration::from_millis(0)),
            ..LockingOptions::default()
        });
        assert!(result.is_ok());
    }
}
