/// Result Interpreter - Payload Classification
///
/// **Core Responsibility:**
/// Turn the raw stdout of one harness run into one [`ExecutionOutcome`].
///
/// **Critical Properties:**
/// - Knows nothing about processes or containers
/// - Pure function: (test, captured stdout) -> outcome
/// - Same payload always yields the same outcome
///
/// **Classification Rules:**
/// - `syntax_error` or `error` in the payload: failed
/// - `expected` set and boolean-shaped (`true`/`false` in any case):
///   case-insensitive comparison with the stringified result
/// - `expected` set otherwise: exact comparison after trimming both sides
/// - no `expected`: passes on `true`, on a value that stringifies to `true`
///   in any case, or on the string `SUCCESS`
///
/// **Display Rules:**
/// - errors: formatted syntax error or the raw traceback
/// - otherwise: captured stdout, else the stringified result, else `Success`
use crate::script::RESULT_SENTINEL;
use pyjudge_common::types::{ExecutionOutcome, TestCase};
use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};

/// Shown when the interpreter printed nothing at all
pub const NO_PAYLOAD_MESSAGE: &str = "Execution finished without producing a result.";

/// Detail of a `SyntaxError` raised while compiling the submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SyntaxErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub line: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
}

/// The structured record written by the harness
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HarnessPayload {
    #[serde(default)]
    pub syntax_error: Option<SyntaxErrorDetail>,
    #[serde(default)]
    pub error: Option<String>,
    /// `None` when the key is absent, `Some(Value::Null)` for an explicit null
    #[serde(default, deserialize_with = "present")]
    pub result: Option<Value>,
    #[serde(default)]
    pub stdout: Option<String>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Pick the payload line out of captured stdout
///
/// The last sentinel-prefixed line wins. Without any, the last non-empty line
/// is used as-is.
pub fn extract_payload_line(stdout: &str) -> Option<&str> {
    let mut last_non_empty = None;
    let mut last_framed = None;

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(payload) = line.strip_prefix(RESULT_SENTINEL) {
            last_framed = Some(payload);
        }
        last_non_empty = Some(line);
    }

    last_framed.or(last_non_empty)
}

/// Parse captured stdout into a payload
pub fn parse_payload(stdout: &str) -> Option<HarnessPayload> {
    let line = extract_payload_line(stdout)?;
    serde_json::from_str(line).ok()
}

/// Classify one harness run
pub fn interpret(test: &TestCase, stdout: &str) -> ExecutionOutcome {
    match parse_payload(stdout) {
        Some(payload) => classify(test, &payload),
        None => {
            let raw = stdout.trim();
            let output = if raw.is_empty() { NO_PAYLOAD_MESSAGE } else { raw };
            ExecutionOutcome::failed(test.id.clone(), output)
        }
    }
}

/// Classify a parsed payload
pub fn classify(test: &TestCase, payload: &HarnessPayload) -> ExecutionOutcome {
    if let Some(detail) = &payload.syntax_error {
        return ExecutionOutcome::failed(test.id.clone(), format_syntax_error(detail));
    }
    if let Some(error) = &payload.error {
        return ExecutionOutcome::failed(test.id.clone(), error.clone());
    }

    let raw = payload.result.as_ref();
    let passed = match test.expected.as_deref() {
        Some(expected) => matches_expected(raw, expected),
        None => is_success(raw),
    };

    let captured = payload.stdout.as_deref().map(str::trim).unwrap_or("");
    let output = if !captured.is_empty() {
        captured.to_string()
    } else if let Some(value) = raw {
        stringify(value)
    } else {
        "Success".to_string()
    };

    if passed {
        ExecutionOutcome::passed(test.id.clone(), output)
    } else {
        ExecutionOutcome::failed(test.id.clone(), output)
    }
}

fn matches_expected(raw: Option<&Value>, expected: &str) -> bool {
    let expected = expected.trim();
    let expected_lower = expected.to_lowercase();

    let actual = match raw {
        Some(Value::Null) | None => String::new(),
        Some(value) => stringify(value),
    };
    let actual = actual.trim();

    if expected_lower == "true" || expected_lower == "false" {
        actual.to_lowercase() == expected_lower
    } else {
        actual == expected
    }
}

fn is_success(raw: Option<&Value>) -> bool {
    match raw {
        Some(Value::Bool(true)) => true,
        Some(Value::String(s)) if s == "SUCCESS" => true,
        Some(value) => stringify(value).to_lowercase() == "true",
        None => false,
    }
}

/// Display form of a result value
///
/// Strings verbatim, top-level numbers without a trailing `.0` when integral,
/// everything else in compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => format_number(n),
        other => other.to_string(),
    }
}

fn format_number(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f == 0.0 => "0".to_string(),
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => format!("{:.0}", f),
        _ => n.to_string(),
    }
}

/// Render a syntax error with its position and a caret under the column
pub fn format_syntax_error(detail: &SyntaxErrorDetail) -> String {
    let message = detail.message.as_deref().unwrap_or("invalid syntax");
    let line = detail.line.filter(|l| *l != 0);
    let offset = detail.offset.filter(|o| *o != 0);

    let mut formatted = String::from("SyntaxError");
    if let Some(line) = line {
        formatted.push_str(&format!(" on line {}", line));
    }
    if let Some(offset) = offset {
        formatted.push_str(&format!(", column {}", offset));
    }
    formatted.push_str(": ");
    formatted.push_str(message);

    let text = detail.text.as_deref().map(str::trim_end).unwrap_or("");
    if !text.is_empty() {
        formatted.push('\n');
        formatted.push_str(text);
        if let Some(offset) = offset.filter(|o| *o > 0) {
            formatted.push('\n');
            formatted.push_str(&" ".repeat((offset - 1) as usize));
            formatted.push('^');
        }
    }

    formatted
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyjudge_common::types::TestStatus;
    use serde_json::json;

    /// Helper to create a test case
    fn make_test(expected: Option<&str>) -> TestCase {
        TestCase {
            id: "t1".to_string(),
            description: "check".to_string(),
            assertion: "def __test__():\n    return True".to_string(),
            expected: expected.map(str::to_string),
        }
    }

    /// Helper to frame a payload the way the harness does
    fn framed(payload: Value) -> String {
        format!("{}{}\n", RESULT_SENTINEL, payload)
    }

    #[test]
    fn test_extract_prefers_last_framed_line() {
        let stdout = format!(
            "noise\n{}{{\"result\": 1}}\nmore noise\n{}{{\"result\": 2}}\ntrailing\n",
            RESULT_SENTINEL, RESULT_SENTINEL
        );
        assert_eq!(extract_payload_line(&stdout), Some("{\"result\": 2}"));
    }

    #[test]
    fn test_extract_falls_back_to_last_non_empty_line() {
        let stdout = "stray\n{\"result\": true}\n\n   \n";
        assert_eq!(extract_payload_line(stdout), Some("{\"result\": true}"));
        assert_eq!(extract_payload_line(""), None);
        assert_eq!(extract_payload_line("\n  \n"), None);
    }

    #[test]
    fn test_true_result_passes_without_expected() {
        let outcome = interpret(&make_test(None), &framed(json!({"result": true, "stdout": ""})));

        assert_eq!(outcome.status, TestStatus::Passed);
        assert_eq!(outcome.output, "true");
    }

    #[test]
    fn test_truthy_strings_pass_without_expected() {
        for result in [json!("SUCCESS"), json!("True"), json!("true")] {
            let outcome = interpret(&make_test(None), &framed(json!({"result": result, "stdout": ""})));
            assert_eq!(outcome.status, TestStatus::Passed, "{result}");
        }

        for result in [json!(false), json!("success"), json!(1), json!(null)] {
            let outcome = interpret(&make_test(None), &framed(json!({"result": result, "stdout": ""})));
            assert_eq!(outcome.status, TestStatus::Failed, "{result}");
        }
    }

    #[test]
    fn test_boolean_expectation_is_case_insensitive() {
        let payload = framed(json!({"result": true, "stdout": ""}));
        assert_eq!(interpret(&make_test(Some("True")), &payload).status, TestStatus::Passed);
        assert_eq!(interpret(&make_test(Some(" TRUE ")), &payload).status, TestStatus::Passed);

        let payload = framed(json!({"result": false, "stdout": ""}));
        assert_eq!(interpret(&make_test(Some("True")), &payload).status, TestStatus::Failed);
        assert_eq!(interpret(&make_test(Some("false")), &payload).status, TestStatus::Passed);
    }

    #[test]
    fn test_literal_expectation_is_exact_after_trim() {
        let payload = framed(json!({"result": "  Hello  ", "stdout": ""}));
        assert_eq!(interpret(&make_test(Some("Hello")), &payload).status, TestStatus::Passed);
        assert_eq!(interpret(&make_test(Some("hello")), &payload).status, TestStatus::Failed);

        let payload = framed(json!({"result": 42, "stdout": ""}));
        assert_eq!(interpret(&make_test(Some("42")), &payload).status, TestStatus::Passed);
    }

    #[test]
    fn test_null_result_compares_as_empty() {
        let payload = framed(json!({"result": null, "stdout": ""}));
        let outcome = interpret(&make_test(Some("")), &payload);

        assert_eq!(outcome.status, TestStatus::Passed);
        assert_eq!(outcome.output, "null");
    }

    #[test]
    fn test_output_prefers_captured_stdout() {
        let payload = framed(json!({"result": true, "stdout": "  debug line\n"}));
        let outcome = interpret(&make_test(None), &payload);

        assert_eq!(outcome.output, "debug line");
    }

    #[test]
    fn test_output_defaults_to_success_without_result() {
        let payload = framed(json!({"stdout": ""}));
        let outcome = interpret(&make_test(None), &payload);

        assert_eq!(outcome.status, TestStatus::Failed);
        assert_eq!(outcome.output, "Success");
    }

    #[test]
    fn test_runtime_error_fails_with_traceback() {
        let traceback = "Traceback (most recent call last):\nZeroDivisionError: division by zero\n";
        let outcome = interpret(&make_test(None), &framed(json!({"error": traceback})));

        assert_eq!(outcome.status, TestStatus::Failed);
        assert_eq!(outcome.output, traceback);
    }

    #[test]
    fn test_syntax_error_fails_with_pointer() {
        let payload = framed(json!({
            "syntax_error": {"message": "invalid syntax", "line": 1, "offset": 7, "text": "def f(:\n"}
        }));
        let outcome = interpret(&make_test(Some("True")), &payload);

        assert_eq!(outcome.status, TestStatus::Failed);
        assert_eq!(
            outcome.output,
            "SyntaxError on line 1, column 7: invalid syntax\ndef f(:\n      ^"
        );
    }

    #[test]
    fn test_format_syntax_error_without_details() {
        let formatted = format_syntax_error(&SyntaxErrorDetail::default());
        assert_eq!(formatted, "SyntaxError: invalid syntax");

        let formatted = format_syntax_error(&SyntaxErrorDetail {
            message: Some("unexpected EOF".to_string()),
            line: Some(3),
            offset: None,
            text: Some("    ".to_string()),
        });
        assert_eq!(formatted, "SyntaxError on line 3: unexpected EOF");
    }

    #[test]
    fn test_unparseable_output_is_reported_raw() {
        let outcome = interpret(&make_test(None), "Segmentation fault\n");

        assert_eq!(outcome.status, TestStatus::Failed);
        assert_eq!(outcome.output, "Segmentation fault");

        let outcome = interpret(&make_test(None), "");
        assert_eq!(outcome.output, NO_PAYLOAD_MESSAGE);
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&json!("text")), "text");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!(null)), "null");
        assert_eq!(stringify(&json!(2.5)), "2.5");
        assert_eq!(stringify(&json!([1, 2, 3])), "[1,2,3]");
        assert_eq!(stringify(&json!({"a": 1})), "{\"a\":1}");
    }

    #[test]
    fn test_stringify_integral_floats() {
        assert_eq!(stringify(&json!(5.0)), "5");
        assert_eq!(stringify(&json!(-3.0)), "-3");
        assert_eq!(stringify(&json!(-0.0)), "0");
        assert_eq!(stringify(&json!(1e20)), "100000000000000000000");
        assert_eq!(stringify(&json!(7)), "7");
        assert_eq!(stringify(&json!(0.1)), "0.1");
        // Only the top-level value is reformatted
        assert_eq!(stringify(&json!([5.0])), "[5.0]");
    }

    #[test]
    fn test_float_result_matches_integer_expectation() {
        let payload = framed(json!({"result": 5.0, "stdout": ""}));
        let outcome = interpret(&make_test(Some("5")), &payload);

        assert_eq!(outcome.status, TestStatus::Passed);
        assert_eq!(outcome.output, "5");
    }

    #[test]
    fn test_classification_is_deterministic() {
        let test = make_test(Some("True"));
        let payload = framed(json!({"result": "true", "stdout": "x"}));

        let first = interpret(&test, &payload);
        for _ in 0..10 {
            assert_eq!(interpret(&test, &payload), first);
        }
    }
}
