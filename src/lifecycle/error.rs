//! Fatal lifecycle errors and their process exit codes.

use crate::config::ConfigError;
use crate::net::ListenError;
use crate::registry::{RegistryError, SingletonInitError};
use crate::scheduler::ScheduleError;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    SingletonInit(#[from] SingletonInitError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("failed to schedule task `{task}`: {source}")]
    Schedule {
        task: String,
        #[source]
        source: ScheduleError,
    },

    #[error("listener error: {0}")]
    Listen(#[from] ListenError),
}

impl LifecycleError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            LifecycleError::Config(_) => 2,
            LifecycleError::SingletonInit(_) | LifecycleError::Registry(_) => 3,
            LifecycleError::Schedule { .. } => 4,
            LifecycleError::Listen(_) => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_kind() {
        let config = LifecycleError::Config(ConfigError::NotFound {
            name: "missing".into(),
            tried: vec![],
        });
        let schedule = LifecycleError::Schedule {
            task: "heartbeat".into(),
            source: ScheduleError::Empty,
        };
        let registry = LifecycleError::Registry(RegistryError::Unknown("db".into()));

        assert_eq!(config.exit_code(), 2);
        assert_eq!(registry.exit_code(), 3);
        assert_eq!(schedule.exit_code(), 4);
        assert_eq!(LifecycleError::Listen(ListenError::NotBound).exit_code(), 5);
    }
}
