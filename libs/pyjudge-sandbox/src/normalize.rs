/// Input Normalizer
///
/// Copy-pasted code and prose often carry typographic characters that Python's
/// parser rejects. Rewriting them to ASCII keeps a syntax error in the report
/// about the student's actual mistake rather than an invisible substitution.

/// Rewrite smart quotes, primes and non-breaking spaces to their ASCII forms.
///
/// Pure, total and idempotent.
pub fn normalize(text: &str) -> String {
    text.chars().map(normalize_char).collect()
}

fn normalize_char(c: char) -> char {
    match c {
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '\u{2036}' => '"',
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' | '\u{2035}' => '\'',
        '\u{00A0}' => ' ',
        other => other,
    }
}
