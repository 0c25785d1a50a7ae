// CLI commands for running submissions locally
use anyhow::{bail, Context, Result};
use pyjudge_common::config::{RunnerConfig, DEFAULT_CONFIG_PATH};
use pyjudge_common::types::{ExecutionOutcome, ExecutionResponse, TestCase};
use pyjudge_sandbox::TestRunner;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Tests file: either a bare array or `{"tests": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TestsFile {
    List(Vec<TestCase>),
    Wrapped { tests: Vec<TestCase> },
}

/// Load test cases from a JSON file
pub fn load_tests(path: &Path) -> Result<Vec<TestCase>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read tests file {}", path.display()))?;

    let tests = match serde_json::from_str::<TestsFile>(&content)
        .with_context(|| format!("Failed to parse tests file {}", path.display()))?
    {
        TestsFile::List(tests) => tests,
        TestsFile::Wrapped { tests } => tests,
    };

    if tests.is_empty() {
        bail!("No tests found in {}", path.display());
    }
    Ok(tests)
}

/// Resolve configuration, applying CLI overrides on top
pub fn resolve_config(config_path: Option<&str>, timeout_ms: Option<u64>) -> Result<RunnerConfig> {
    let mut config = match config_path {
        Some(path) => {
            let mut config = RunnerConfig::load(Path::new(path))?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            config
        }
        None => RunnerConfig::load_default()?,
    };

    if let Some(timeout_ms) = timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    config.validate()?;
    debug!(backend = ?config.backend, timeout_ms = config.timeout_ms, "Resolved runner configuration");
    Ok(config)
}

/// Run a submission file against a tests file; returns whether all passed
pub async fn run_submission(
    code_path: &str,
    tests_path: &str,
    config: &RunnerConfig,
    json: bool,
) -> Result<bool> {
    let code = fs::read_to_string(code_path)
        .with_context(|| format!("Failed to read submission {}", code_path))?;
    if code.is_empty() {
        bail!("Submission {} is empty", code_path);
    }
    let tests = load_tests(Path::new(tests_path))?;

    let runner = TestRunner::from_config(config)?;

    if !json {
        println!("🚀 Running {} test(s) against {}", tests.len(), code_path);
        println!("  Engine: {}", runner.engine_name());
        println!("  Timeout per test: {}ms", config.timeout_ms);
        println!();
    }

    let results = runner.run(&code, &tests).await;
    let all_passed = results.iter().all(ExecutionOutcome::is_passed);

    if json {
        let response = ExecutionResponse { results };
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_report(&tests, &results);
    }

    Ok(all_passed)
}

fn print_report(tests: &[TestCase], results: &[ExecutionOutcome]) {
    for (test, result) in tests.iter().zip(results) {
        let mark = if result.is_passed() { "✓" } else { "✗" };
        if test.description.is_empty() {
            println!("  {} {}", mark, result.id);
        } else {
            println!("  {} {} - {}", mark, result.id, test.description);
        }
        for line in result.output.lines() {
            println!("      {}", line);
        }
    }

    let passed = results.iter().filter(|r| r.is_passed()).count();
    println!();
    println!("Passed: {} / {}", passed, results.len());
}

/// Run one trivial test to confirm the configured engine works
pub async fn doctor(config: &RunnerConfig) -> Result<()> {
    println!("🩺 Checking execution engine...");
    println!("  Backend: {:?}", config.backend);
    println!("  Interpreter: {}", config.interpreter());

    let runner = TestRunner::from_config(config)?;
    let probe = TestCase {
        id: "doctor".to_string(),
        description: "interpreter round trip".to_string(),
        assertion: "def __test__():\n    return sum([1, 2, 3]) == 6\n__test__()\n".to_string(),
        expected: Some("True".to_string()),
    };

    let results = runner.run("import sys\n", std::slice::from_ref(&probe)).await;
    match results.first() {
        Some(result) if result.is_passed() => {
            println!("✅ Engine '{}' is working", runner.engine_name());
            Ok(())
        }
        Some(result) => bail!("Engine check failed:\n{}", result.output),
        None => bail!("Engine check produced no result"),
    }
}

/// Print the resolved configuration
pub fn show_config(config: &RunnerConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Write a default configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<()> {
    let path = Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH));
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let content = serde_json::to_string_pretty(&RunnerConfig::default())?;
    fs::write(path, content + "\n")
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✅ Created: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_tests_accepts_bare_array() {
        let file = write_temp(r#"[{"id": "a", "assertion": "def __test__(): return True"}]"#);
        let tests = load_tests(file.path()).unwrap();

        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].id, "a");
    }

    #[test]
    fn test_load_tests_accepts_wrapped_object() {
        let file = write_temp(
            r#"{"tests": [{"id": "a", "description": "d", "assertion": "x", "expected": "True"}]}"#,
        );
        let tests = load_tests(file.path()).unwrap();

        assert_eq!(tests[0].expected.as_deref(), Some("True"));
    }

    #[test]
    fn test_load_tests_rejects_empty() {
        let file = write_temp("[]");
        assert!(load_tests(file.path()).is_err());
    }

    #[test]
    fn test_init_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("runner.json");
        let path_str = path.to_str().unwrap();

        init_config(Some(path_str), false).unwrap();
        assert!(init_config(Some(path_str), false).is_err());
        init_config(Some(path_str), true).unwrap();

        let loaded = RunnerConfig::load(&path).unwrap();
        assert_eq!(loaded, RunnerConfig::default());
    }

    #[test]
    fn test_resolve_config_applies_timeout_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.json");
        fs::write(&path, r#"{"timeout_ms": 3000}"#).unwrap();

        let config = resolve_config(path.to_str(), Some(1200)).unwrap();
        assert_eq!(config.timeout_ms, 1200);

        assert!(resolve_config(path.to_str(), Some(0)).is_err());
    }
}
