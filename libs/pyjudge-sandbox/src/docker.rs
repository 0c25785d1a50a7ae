// Docker container backend using Bollard
//
// Alternative to the local-process engine for hosts that should not run
// student code directly: each execution gets its own throwaway container.

use crate::engine::{EngineError, ExecutionEngine, ExecutionLimits, RawOutput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use pyjudge_common::config::RunnerConfig;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Container cleanup guard - guarantees container removal on drop
struct ContainerGuard<'a> {
    docker: &'a Docker,
    container_id: String,
}

impl<'a> ContainerGuard<'a> {
    fn new(docker: &'a Docker, container_id: String) -> Self {
        Self {
            docker,
            container_id,
        }
    }
}

impl Drop for ContainerGuard<'_> {
    fn drop(&mut self) {
        // Drop cannot be async; removal is best-effort on the runtime
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            if let Err(e) = docker.remove_container(&container_id, Some(remove_options)).await {
                warn!(container_id = %container_id, error = %e, "Failed to remove container");
            }
        });
    }
}

/// Docker-based engine
///
/// **Container Rules:**
/// 1. Pulls the configured image if it is not present
/// 2. Network disabled, memory and CPU capped
/// 3. Script passed as `<interpreter> <args> -c <script>`, no shell involved
/// 4. Killed on timeout or output overflow, always removed afterwards
pub struct DockerEngine {
    docker: Docker,
    image: String,
    interpreter: String,
    args: Vec<String>,
    memory_limit_bytes: i64,
    nano_cpus: i64,
}

impl DockerEngine {
    pub fn from_config(config: &RunnerConfig) -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;

        Ok(Self {
            docker,
            image: config.docker.image.clone(),
            // The image's interpreter, not the host's platform default
            interpreter: config
                .interpreter
                .clone()
                .unwrap_or_else(|| "python3".to_string()),
            args: config.interpreter_args.clone(),
            memory_limit_bytes: i64::from(config.docker.memory_limit_mb) * 1024 * 1024,
            nano_cpus: (f64::from(config.docker.cpu_limit) * 1_000_000_000.0) as i64,
        })
    }

    fn command(&self, script: &str) -> Vec<String> {
        let mut cmd = Vec::with_capacity(self.args.len() + 3);
        cmd.push(self.interpreter.clone());
        cmd.extend(self.args.iter().cloned());
        cmd.push("-c".to_string());
        cmd.push(script.to_string());
        cmd
    }

    /// Ensure the image is available locally, pulling it on a cache miss
    async fn ensure_image(&self) -> Result<(), EngineError> {
        if self.docker.inspect_image(&self.image).await.is_ok() {
            debug!(image = %self.image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %self.image, "Image cache miss, pulling");

        let options = Some(CreateImageOptions {
            from_image: self.image.as_str(),
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|source| EngineError::Container {
                context: "Failed to pull Docker image",
                source,
            })?;
        }

        info!(image = %self.image, "Image pulled");
        Ok(())
    }

    /// Follow container logs until it exits, then read its exit code
    async fn collect_output(
        &self,
        container_id: &str,
        limit: usize,
    ) -> Result<(String, String, Option<i64>), EngineError> {
        let mut stdout = String::new();
        let mut stderr = String::new();

        let logs_options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            ..Default::default()
        });

        let mut logs_stream = self.docker.logs(container_id, logs_options);
        while let Some(output) = logs_stream.next().await {
            match output {
                Ok(LogOutput::StdOut { message }) => {
                    stdout.push_str(&String::from_utf8_lossy(&message));
                    if stdout.len() > limit {
                        return Err(EngineError::OutputLimitExceeded {
                            stream: "stdout",
                            limit,
                        });
                    }
                }
                Ok(LogOutput::StdErr { message }) => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                    if stderr.len() > limit {
                        return Err(EngineError::OutputLimitExceeded {
                            stream: "stderr",
                            limit,
                        });
                    }
                }
                Ok(_) => {}
                Err(source) => {
                    return Err(EngineError::Container {
                        context: "Failed to read container logs",
                        source,
                    });
                }
            }
        }

        let wait_options = Some(WaitContainerOptions {
            condition: "not-running",
        });

        // Bollard reports a non-zero exit as an error carrying the code
        let mut wait_stream = self.docker.wait_container(container_id, wait_options);
        let exit_code = match wait_stream.next().await {
            Some(Ok(response)) => Some(response.status_code),
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Some(code),
            Some(Err(source)) => {
                return Err(EngineError::Container {
                    context: "Failed to wait for container",
                    source,
                });
            }
            None => None,
        };

        Ok((stdout, stderr, exit_code))
    }
}

#[async_trait]
impl ExecutionEngine for DockerEngine {
    #[instrument(skip(self, script), fields(image = %self.image, script_bytes = script.len(), timeout_ms = limits.timeout_ms()))]
    async fn execute(
        &self,
        script: &str,
        limits: &ExecutionLimits,
    ) -> Result<RawOutput, EngineError> {
        self.ensure_image().await?;

        let container_name = format!("pyjudge-{}", uuid::Uuid::new_v4());

        let config = Config {
            image: Some(self.image.clone()),
            cmd: Some(self.command(script)),
            env: Some(vec!["PYTHONDONTWRITEBYTECODE=1".to_string()]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(bollard::models::HostConfig {
                memory: Some(self.memory_limit_bytes),
                nano_cpus: Some(self.nano_cpus),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|source| EngineError::Container {
                context: "Failed to create container",
                source,
            })?;

        let container_id = container.id.clone();
        let _guard = ContainerGuard::new(&self.docker, container_id.clone());

        let start_time = Instant::now();

        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|source| EngineError::Container {
                context: "Failed to start container",
                source,
            })?;

        let collected = tokio::time::timeout(
            limits.timeout,
            self.collect_output(&container_id, limits.max_output_bytes),
        )
        .await;

        let (stdout, mut stderr, code) = match collected {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                self.kill(&container_id).await;
                return Err(e);
            }
            Err(_) => {
                warn!(timeout_ms = limits.timeout_ms(), "Execution timed out, killing container");
                self.kill(&container_id).await;
                return Err(EngineError::TimedOut {
                    timeout_ms: limits.timeout_ms(),
                });
            }
        };

        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        if code != Some(0) {
            match code {
                Some(137) => stderr.push_str("\n[Container killed: likely OOM or exceeded memory limit]"),
                Some(139) => stderr.push_str("\n[Container killed: segmentation fault]"),
                _ => {}
            }
            return Err(EngineError::NonZeroExit {
                code,
                stdout,
                stderr,
            });
        }

        debug!(execution_time_ms, container_id = %container_id, "Container finished");
        Ok(RawOutput {
            stdout,
            stderr,
            execution_time_ms,
        })
    }

    fn name(&self) -> &'static str {
        "docker"
    }
}

impl DockerEngine {
    async fn kill(&self, container_id: &str) {
        if let Err(e) = self
            .docker
            .kill_container(container_id, None::<KillContainerOptions<String>>)
            .await
        {
            warn!(container_id = %container_id, error = %e, "Failed to kill container");
        }
    }
}
