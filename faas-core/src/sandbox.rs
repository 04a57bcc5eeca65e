//! Sandboxed execution: run a built image in a locked-down container
//! under the run deadline, with invocation input passed as environment
//! variables.

use std::collections::HashMap;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::process;

// Fixed ceilings applied to every invocation; no per-function override.
const MEMORY_LIMIT: &str = "128m";
const CPU_LIMIT: &str = "0.5";
const DNS_RESOLVER: &str = "8.8.8.8";

pub struct SandboxRunner {
    run_timeout: Duration,
}

impl SandboxRunner {
    pub fn new(run_timeout: Duration) -> Self {
        Self { run_timeout }
    }

    /// Run the image to completion or until the deadline elapses,
    /// returning its combined output verbatim.
    pub async fn run(
        &self,
        image: &str,
        input: Option<&HashMap<String, String>>,
    ) -> Result<String, Error> {
        // Named so a timed-out container can be removed by name.
        let container = format!("faas-run-{}", Uuid::new_v4());

        let mut command = Command::new("docker");
        command
            .args(["run", "--rm", "--name"])
            .arg(&container)
            .arg("--network=bridge")
            .arg(format!("--dns={}", DNS_RESOLVER))
            .arg("--cap-drop=ALL")
            .arg("--security-opt=no-new-privileges")
            .arg(format!("--memory={}", MEMORY_LIMIT))
            .arg(format!("--cpus={}", CPU_LIMIT));

        if let Some(input) = input {
            for (key, value) in sanitized_env(input) {
                command.arg("-e").arg(format!("{}={}", key, value));
            }
        }
        command.arg(image);

        info!(%image, %container, "running container");

        match process::run_with_deadline(command, self.run_timeout).await {
            Ok(output) if output.success => Ok(output.combined),
            Ok(output) => Err(Error::ExecutionFailed(output.combined)),
            Err(Error::Timeout(secs)) => {
                // Killing the docker client leaves the container itself
                // running; remove it by name so nothing is held.
                self.remove_container(&container).await;
                Err(Error::Timeout(secs))
            }
            Err(err) => Err(err),
        }
    }

    async fn remove_container(&self, name: &str) {
        let result = Command::new("docker")
            .args(["rm", "-f", name])
            .output()
            .await;
        if let Err(err) = result {
            warn!(container = %name, error = %err, "failed to remove timed-out container");
        }
    }
}

/// Map invocation input to environment-variable-safe names. Distinct
/// keys may collapse to the same sanitized name; one value wins, which
/// one is unspecified.
fn sanitized_env(input: &HashMap<String, String>) -> HashMap<String, String> {
    input
        .iter()
        .map(|(key, value)| (sanitize_env_key(key), value.clone()))
        .collect()
}

/// Upper-case the key and replace anything outside `[A-Za-z0-9]` with an
/// underscore.
pub fn sanitize_env_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
