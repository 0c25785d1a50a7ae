use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages the runner accepts on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
}

impl Language {
    /// Case-insensitive lookup of a language tag.
    pub fn from_str(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "python" => Some(Language::Python),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
        }
    }
}

/// One assertion to check against a submission.
///
/// `assertion` is source code that defines a zero-argument `__test__`
/// function. Its return value is compared against `expected` when present,
/// otherwise its truthiness decides the verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub assertion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

/// A submission plus the tests to run against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub tests: Vec<TestCase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Verdict for one test, in the same position as its `TestCase`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub id: String,
    pub status: TestStatus,
    pub output: String,
}

impl ExecutionOutcome {
    pub fn passed(id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TestStatus::Passed,
            output: output.into(),
        }
    }

    pub fn failed(id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TestStatus::Failed,
            output: output.into(),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

/// Response body shared by the HTTP service and the CLI's JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub results: Vec<ExecutionOutcome>,
}
