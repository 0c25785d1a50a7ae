/// Test Runner - High-Level Orchestration
///
/// **Responsibility:**
/// Drive normalize -> synthesize -> execute -> interpret for every test of a
/// request and return one outcome per test, in input order.
///
/// **Fault Isolation:**
/// Every test gets its own script and its own interpreter. An engine failure
/// (launch error, timeout, output overflow, crash) becomes a failed outcome
/// for that test only; the remaining tests still run. Nothing is retried.
use crate::engine::{build_engine, EngineError, ExecutionEngine, ExecutionLimits};
use crate::evaluator;
use crate::normalize::normalize;
use crate::script::synthesize;
use futures_util::stream::{self, StreamExt};
use pyjudge_common::config::RunnerConfig;
use pyjudge_common::types::{ExecutionOutcome, TestCase};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Clone)]
pub struct TestRunner {
    engine: Arc<dyn ExecutionEngine>,
    limits: ExecutionLimits,
    max_parallel_tests: usize,
}

impl TestRunner {
    pub fn new(engine: Arc<dyn ExecutionEngine>, limits: ExecutionLimits) -> Self {
        Self {
            engine,
            limits,
            max_parallel_tests: 1,
        }
    }

    /// Build the engine and limits described by `config`
    pub fn from_config(config: &RunnerConfig) -> anyhow::Result<Self> {
        let engine = build_engine(config)?;
        Ok(Self::new(engine, ExecutionLimits::from_config(config))
            .with_max_parallel_tests(config.max_parallel_tests))
    }

    /// Allow up to `n` tests of one request to execute at the same time
    pub fn with_max_parallel_tests(mut self, n: usize) -> Self {
        self.max_parallel_tests = n.max(1);
        self
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Run every test against `code`; outcomes come back in input order
    #[instrument(skip(self, code, tests), fields(engine = self.engine.name(), test_count = tests.len(), source_size = code.len()))]
    pub async fn run(&self, code: &str, tests: &[TestCase]) -> Vec<ExecutionOutcome> {
        let start = Instant::now();
        let code = normalize(code);

        let pending: Vec<_> = tests
            .iter()
            .enumerate()
            .map(|(idx, test)| self.run_test(&code, idx, test))
            .collect();
        let outcomes: Vec<ExecutionOutcome> = stream::iter(pending)
            .buffered(self.max_parallel_tests)
            .collect()
            .await;

        let passed = outcomes.iter().filter(|o| o.is_passed()).count();
        info!(
            passed,
            failed = outcomes.len() - passed,
            execution_ms = start.elapsed().as_millis() as u64,
            "Test run completed"
        );

        outcomes
    }

    /// One test through the whole pipeline; `code` is already normalized
    async fn run_test(&self, code: &str, idx: usize, test: &TestCase) -> ExecutionOutcome {
        debug!(test_num = idx + 1, test_id = %test.id, "Test pending");

        let assertion = normalize(&test.assertion);
        debug!(test_id = %test.id, "Test normalized");

        let script = synthesize(code, &assertion);
        debug!(test_id = %test.id, script_bytes = script.len(), "Test synthesized");

        debug!(test_id = %test.id, "Test executing");
        let outcome = match self.engine.execute(&script, &self.limits).await {
            Ok(raw) => {
                debug!(
                    test_id = %test.id,
                    execution_ms = raw.execution_time_ms,
                    "Execution finished"
                );
                evaluator::interpret(test, &raw.stdout)
            }
            Err(e) => engine_failure(test, &e),
        };

        debug!(test_id = %test.id, status = %outcome.status, "Test completed");
        outcome
    }
}

fn engine_failure(test: &TestCase, error: &EngineError) -> ExecutionOutcome {
    if error.is_timeout() {
        warn!(test_id = %test.id, error = %error, "Test timed out");
    } else {
        warn!(test_id = %test.id, error = %error, "Test execution failed");
    }
    ExecutionOutcome::failed(test.id.clone(), error.diagnostic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RawOutput;
    use crate::script::RESULT_SENTINEL;
    use async_trait::async_trait;
    use pyjudge_common::types::TestStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Engine that answers from the assertion text instead of running it
    #[derive(Default)]
    struct ScriptedEngine {
        calls: AtomicUsize,
        scripts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExecutionEngine for ScriptedEngine {
        async fn execute(
            &self,
            script: &str,
            limits: &ExecutionLimits,
        ) -> Result<RawOutput, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.scripts.lock().unwrap().push(script.to_string());

            if script.contains("slow") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if script.contains("hang") {
                return Err(EngineError::TimedOut {
                    timeout_ms: limits.timeout_ms(),
                });
            }
            if script.contains("crash") {
                return Err(EngineError::NonZeroExit {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "Fatal Python error".to_string(),
                });
            }

            let payload = if script.contains("divide") {
                r#"{"error": "ZeroDivisionError: division by zero"}"#
            } else {
                r#"{"result": true, "stdout": ""}"#
            };
            Ok(RawOutput {
                stdout: format!("{}{}\n", RESULT_SENTINEL, payload),
                stderr: String::new(),
                execution_time_ms: 1,
            })
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn make_test(id: &str, assertion: &str) -> TestCase {
        TestCase {
            id: id.to_string(),
            description: String::new(),
            assertion: assertion.to_string(),
            expected: None,
        }
    }

    fn runner(engine: Arc<ScriptedEngine>) -> TestRunner {
        TestRunner::new(engine, ExecutionLimits::default())
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let engine = Arc::new(ScriptedEngine::default());
        let tests = vec![
            make_test("divide", "def __test__(): return 1/0  # divide"),
            make_test("ok", "def __test__(): return True"),
        ];

        let outcomes = runner(engine.clone()).run("x = 1", &tests).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].status, TestStatus::Failed);
        assert!(outcomes[0].output.contains("ZeroDivisionError"));
        assert_eq!(outcomes[1].status, TestStatus::Passed);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_engine_errors_become_failed_outcomes() {
        let engine = Arc::new(ScriptedEngine::default());
        let tests = vec![
            make_test("hang", "# hang"),
            make_test("crash", "# crash"),
            make_test("ok", "def __test__(): return True"),
        ];

        let outcomes = runner(engine).run("x = 1", &tests).await;

        assert_eq!(outcomes[0].status, TestStatus::Failed);
        assert_eq!(outcomes[0].output, "Execution timed out after 8000ms");
        assert_eq!(outcomes[1].status, TestStatus::Failed);
        assert_eq!(outcomes[1].output, "Fatal Python error");
        assert_eq!(outcomes[2].status, TestStatus::Passed);
    }

    #[tokio::test]
    async fn test_order_preserved_with_parallelism() {
        let engine = Arc::new(ScriptedEngine::default());
        let tests: Vec<TestCase> = (0..6)
            .map(|i| {
                let marker = if i % 2 == 0 { "slow" } else { "fast" };
                make_test(&format!("t{}", i), &format!("# {}", marker))
            })
            .collect();

        let outcomes = runner(engine)
            .with_max_parallel_tests(3)
            .run("x = 1", &tests)
            .await;

        let ids: Vec<&str> = outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["t0", "t1", "t2", "t3", "t4", "t5"]);
    }

    #[tokio::test]
    async fn test_sources_are_normalized_before_synthesis() {
        let engine = Arc::new(ScriptedEngine::default());
        let tests = vec![make_test("t1", "def __test__():\u{00A0}return \u{201C}ok\u{201D}")];

        runner(engine.clone())
            .run("name = \u{2018}x\u{2019}", &tests)
            .await;

        let scripts = engine.scripts.lock().unwrap();
        assert!(scripts[0].contains("_SUBMISSION = \"name = 'x'\""));
        assert!(scripts[0].contains("_ASSERTION = \"def __test__(): return \\\"ok\\\"\""));
    }

    #[tokio::test]
    async fn test_empty_test_list_yields_no_outcomes() {
        let engine = Arc::new(ScriptedEngine::default());
        let outcomes = runner(engine.clone()).run("x = 1", &[]).await;

        assert!(outcomes.is_empty());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_parallelism_is_at_least_one() {
        let engine = Arc::new(ScriptedEngine::default());
        let runner = runner(engine).with_max_parallel_tests(0);
        assert_eq!(runner.max_parallel_tests, 1);
    }
}
