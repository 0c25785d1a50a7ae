//! Sandboxed execution of student Python submissions against test assertions.
//!
//! Pipeline per test: [`normalize`] the sources, [`script::synthesize`] one
//! harness script, run it on an [`engine::ExecutionEngine`], and turn the
//! captured output into an outcome with [`evaluator::interpret`].
//! [`runner::TestRunner`] drives the pipeline for a whole request.

pub mod docker;
pub mod engine;
pub mod evaluator;
pub mod normalize;
pub mod runner;
pub mod script;

pub use engine::{EngineError, ExecutionEngine, ExecutionLimits, ProcessEngine, RawOutput};
pub use normalize::normalize;
pub use runner::TestRunner;
