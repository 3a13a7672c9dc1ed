//! Docker daemon availability probe

use anyhow::Result;
use std::path::Path;
use tracing::debug;

const DOCKER_SOCKET_PATH: &str = "/var/run/docker.sock";

/// Outcome of a daemon probe.
#[derive(Debug, Clone)]
pub struct DockerStatus {
    pub available: bool,
    pub api_version: Option<String>,
}

/// Check whether a Docker daemon is reachable.
pub async fn check_docker() -> Result<DockerStatus> {
    if !Path::new(DOCKER_SOCKET_PATH).exists() {
        debug!("docker socket not found at {}", DOCKER_SOCKET_PATH);
        return Ok(DockerStatus {
            available: false,
            api_version: None,
        });
    }

    use bollard::Docker;

    let docker = match Docker::connect_with_local_defaults() {
        Ok(d) => d,
        Err(e) => {
            debug!("failed to connect to docker: {}", e);
            return Ok(DockerStatus {
                available: false,
                api_version: None,
            });
        }
    };

    match docker.version().await {
        Ok(v) => {
            let api_version = v.api_version;
            debug!(api_version = ?api_version, "docker daemon reachable");
            Ok(DockerStatus {
                available: true,
                api_version,
            })
        }
        Err(e) => {
            debug!("failed to get docker version: {}", e);
            Ok(DockerStatus {
                available: false,
                api_version: None,
            })
        }
    }
}
