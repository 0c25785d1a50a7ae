/// Script Synthesizer
///
/// Builds one self-contained Python program per (submission, test) pair. The
/// program runs the submission in a fresh namespace, runs the assertion with
/// its output captured, and writes exactly one structured record:
///
/// - `{"syntax_error": {"message", "line", "offset", "text"}}`
/// - `{"error": "<traceback>"}`
/// - `{"result": <value>, "stdout": "<captured text>"}`
///
/// The record goes to a dedicated copy of the original stdout and is prefixed
/// with [`RESULT_SENTINEL`]; see `harness.py`.
///
/// **Embedding:** every input reaches the script as one string literal
/// produced by [`python_literal`]. The script is assembled by appending fixed
/// segments and literals in order, so nothing ever rescans embedded text.

/// Zero-argument function every assertion defines
pub const ENTRY_POINT: &str = "__test__";

/// Name under which the harness exposes its capture hook to the assertion
pub const CAPTURE_HOOK: &str = "__pyjudge_capture__";

/// Prefix of the payload line on the protocol channel
pub const RESULT_SENTINEL: &str = "__pyjudge_result__:";

const PRELUDE: &str = "import ast\nimport contextlib\nimport io\nimport json\nimport linecache\nimport os\nimport sys\nimport traceback\n\n";

const HARNESS: &str = include_str!("harness.py");

/// Synthesize the harness script for one test.
///
/// Both inputs are expected to be normalized already.
pub fn synthesize(code: &str, assertion: &str) -> String {
    let mut script = String::with_capacity(
        PRELUDE.len() + HARNESS.len() + code.len() + assertion.len() + 256,
    );

    script.push_str(PRELUDE);
    bind_literal(&mut script, "_SENTINEL", RESULT_SENTINEL);
    bind_literal(&mut script, "_ENTRY", ENTRY_POINT);
    bind_literal(&mut script, "_CAPTURE", CAPTURE_HOOK);
    bind_literal(&mut script, "_SUBMISSION", code);
    bind_literal(&mut script, "_ASSERTION", assertion);
    script.push_str(HARNESS);

    script
}

fn bind_literal(script: &mut String, name: &str, value: &str) {
    script.push_str(name);
    script.push_str(" = ");
    script.push_str(&python_literal(value));
    script.push('\n');
}

/// Encode `value` as a single-line, ASCII-only Python string literal.
///
/// A JSON string literal is a valid Python literal: quotes, backslashes and
/// control characters come out escaped. Non-ASCII characters are then written
/// with Python's `\u`/`\U` escapes so the script survives any argv encoding.
pub fn python_literal(value: &str) -> String {
    let json = serde_json::Value::String(value.to_owned()).to_string();
    if json.is_ascii() {
        return json;
    }

    let mut literal = String::with_capacity(json.len() + 16);
    for c in json.chars() {
        match c as u32 {
            0..=0x7F => literal.push(c),
            cp @ 0x80..=0xFFFF => literal.push_str(&format!("\\u{:04x}", cp)),
            cp => literal.push_str(&format!("\\U{:08x}", cp)),
        }
    }
    literal
}
