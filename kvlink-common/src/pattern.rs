//! # Glob Matching
//!
//! Redis-style glob patterns as accepted by `KEYS` and `SCAN ... MATCH`:
//!
//! - `*` matches any run of bytes, including none
//! - `?` matches exactly one byte
//! - `[abc]`, `[a-z]` match one byte from the set; `[^abc]` negates it
//! - `\x` matches `x` literally
//!
//! Matching is byte-wise and case-sensitive.

/// Returns true when `text` matches the glob `pattern`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    match_bytes(pattern.as_bytes(), text.as_bytes())
}

fn match_bytes(mut pattern: &[u8], mut text: &[u8]) -> bool {
    while let Some(&head) = pattern.first() {
        match head {
            b'*' => {
                while pattern.first() == Some(&b'*') {
                    pattern = &pattern[1..];
                }
                if pattern.is_empty() {
                    return true;
                }
                for start in 0..=text.len() {
                    if match_bytes(pattern, &text[start..]) {
                        return true;
                    }
                }
                return false;
            }
            b'?' => {
                if text.is_empty() {
                    return false;
                }
                pattern = &pattern[1..];
                text = &text[1..];
            }
            b'[' => {
                let Some(&byte) = text.first() else {
                    return false;
                };
                let (matched, consumed) = match_class(&pattern[1..], byte);
                if !matched {
                    return false;
                }
                pattern = &pattern[1 + consumed..];
                text = &text[1..];
            }
            b'\\' if pattern.len() >= 2 => {
                if text.first() != Some(&pattern[1]) {
                    return false;
                }
                pattern = &pattern[2..];
                text = &text[1..];
            }
            literal => {
                if text.first() != Some(&literal) {
                    return false;
                }
                pattern = &pattern[1..];
                text = &text[1..];
            }
        }
    }
    text.is_empty()
}

/// Matches `byte` against a bracket class whose body starts at `class`
/// (just past the opening `[`).
///
/// Returns the outcome and the number of pattern bytes consumed, including
/// the closing `]`. An unterminated class runs to the end of the pattern.
fn match_class(class: &[u8], byte: u8) -> (bool, usize) {
    let mut idx = 0;
    let negate = class.first() == Some(&b'^');
    if negate {
        idx += 1;
    }

    let mut matched = false;
    while idx < class.len() {
        let current = class[idx];
        if current == b']' {
            idx += 1;
            return (matched != negate, idx);
        }
        if current == b'\\' && idx + 1 < class.len() {
            if class[idx + 1] == byte {
                matched = true;
            }
            idx += 2;
        } else if idx + 2 < class.len() && class[idx + 1] == b'-' {
            let (mut lo, mut hi) = (current, class[idx + 2]);
            if lo > hi {
                std::mem::swap(&mut lo, &mut hi);
            }
            if (lo..=hi).contains(&byte) {
                matched = true;
            }
            idx += 3;
        } else {
            if current == byte {
                matched = true;
            }
            idx += 1;
        }
    }

    (matched != negate, idx)
}
