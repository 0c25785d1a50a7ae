// Runner configuration shared by the API service and the CLI
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Default location of the runner configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/runner.json";

/// Environment variable that overrides `DEFAULT_CONFIG_PATH`
pub const CONFIG_PATH_ENV: &str = "PYJUDGE_CONFIG";

/// Which isolation backend executes synthesized scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    /// One local interpreter process per test
    Process,
    /// One Docker container per test
    Docker,
}

impl EngineBackend {
    pub fn from_str(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "process" => Some(EngineBackend::Process),
            "docker" => Some(EngineBackend::Docker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerSettings {
    pub image: String,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            image: "python:3.12-slim".to_string(),
            memory_limit_mb: 256,
            cpu_limit: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub backend: EngineBackend,
    /// Interpreter binary; the platform default is used when unset
    pub interpreter: Option<String>,
    /// Flags placed before `-c <script>`
    pub interpreter_args: Vec<String>,
    pub timeout_ms: u64,
    /// Ceiling for each of stdout and stderr
    pub max_output_bytes: usize,
    pub max_parallel_tests: usize,
    pub docker: DockerSettings,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::Process,
            interpreter: None,
            interpreter_args: vec!["-I".to_string()],
            timeout_ms: 8000,
            max_output_bytes: 1024 * 1024,
            max_parallel_tests: 1,
            docker: DockerSettings::default(),
        }
    }
}

/// Interpreter binary name for the host platform
pub fn default_interpreter() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

impl RunnerConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Runner config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: RunnerConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `PYJUDGE_CONFIG` or `config/runner.json`, then apply
    /// environment overrides. A missing default file yields the defaults.
    pub fn load_default() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load(default_path)?
                } else {
                    debug!("No runner config at {}, using defaults", DEFAULT_CONFIG_PATH);
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        info!(
            backend = ?config.backend,
            interpreter = %config.interpreter(),
            timeout_ms = config.timeout_ms,
            max_output_bytes = config.max_output_bytes,
            max_parallel_tests = config.max_parallel_tests,
            "Runner configuration loaded"
        );

        Ok(config)
    }

    /// Apply `PYJUDGE_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("PYJUDGE_BACKEND") {
            self.backend = EngineBackend::from_str(&backend)
                .with_context(|| format!("Invalid PYJUDGE_BACKEND: {}", backend))?;
        }
        if let Some(interpreter) = lookup("PYJUDGE_INTERPRETER") {
            self.interpreter = Some(interpreter);
        }
        if let Some(timeout) = lookup("PYJUDGE_TIMEOUT_MS") {
            self.timeout_ms = timeout
                .parse()
                .with_context(|| format!("Invalid PYJUDGE_TIMEOUT_MS: {}", timeout))?;
        }
        if let Some(limit) = lookup("PYJUDGE_MAX_OUTPUT_BYTES") {
            self.max_output_bytes = limit
                .parse()
                .with_context(|| format!("Invalid PYJUDGE_MAX_OUTPUT_BYTES: {}", limit))?;
        }
        if let Some(parallel) = lookup("PYJUDGE_MAX_PARALLEL") {
            self.max_parallel_tests = parallel
                .parse()
                .with_context(|| format!("Invalid PYJUDGE_MAX_PARALLEL: {}", parallel))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }
        if self.max_output_bytes == 0 {
            bail!("max_output_bytes must be greater than zero");
        }
        if self.max_parallel_tests == 0 {
            bail!("max_parallel_tests must be greater than zero");
        }
        if let Some(interpreter) = &self.interpreter {
            if interpreter.trim().is_empty() {
                bail!("interpreter must not be empty");
            }
        }
        Ok(())
    }

    /// Configured interpreter, or the platform default
    pub fn interpreter(&self) -> String {
        self.interpreter
            .clone()
            .unwrap_or_else(|| default_interpreter().to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
