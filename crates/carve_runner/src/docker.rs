//! Docker daemon probe over the Docker API.

use bollard::Docker;
use tracing::debug;

use crate::error::RunnerResult;

/// Thin client used to check daemon reachability before running compose.
#[derive(Clone)]
pub struct DockerDaemon {
    client: Docker,
}

impl DockerDaemon {
    /// Connect using the local defaults (socket or `DOCKER_HOST`).
    ///
    /// Connecting does not contact the daemon; use [`ping`](Self::ping).
    pub fn connect() -> RunnerResult<Self> {
        let client = Docker::connect_with_local_defaults()?;
        Ok(Self { client })
    }

    /// Ping the daemon.
    pub async fn ping(&self) -> RunnerResult<()> {
        let reply = self.client.ping().await?;
        debug!("Docker daemon ping: {}", reply);
        Ok(())
    }
}

impl std::fmt::Debug for DockerDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerDaemon").finish_non_exhaustive()
    }
}
