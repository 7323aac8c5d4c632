use serde_json::Value;

/// A structured literal found inside a log message
#[derive(Clone, Debug, PartialEq)]
pub struct Extracted {
    /// The parsed literal
    pub value: Value,

    /// Byte offset of the opening delimiter
    pub start: usize,

    /// Byte offset of the closing delimiter (inclusive)
    pub end: usize,
}

/// Find the first syntactically balanced JSON object or array embedded in
/// `text`.
///
/// The scan walks candidate opening delimiters left to right. From each one
/// it tracks a stack of expected closers, skipping over string literals and
/// escapes, so payloads containing nested braces or brace characters inside
/// strings are handled. A balanced span that `serde_json` rejects abandons
/// that candidate and the scan moves to the next opener.
pub fn extract_json(text: &str) -> Option<Extracted> {
    let bytes = text.as_bytes();

    for start in 0..bytes.len() {
        if bytes[start] != b'{' && bytes[start] != b'[' {
            continue;
        }
        let Some(end) = balanced_end(bytes, start) else {
            continue;
        };
        // Structural delimiters are ASCII, so these offsets sit on char
        // boundaries even in multi-byte text.
        if let Ok(value) = serde_json::from_str(&text[start..=end]) {
            return Some(Extracted { value, start, end });
        }
    }

    None
}

/// Scan from an opening delimiter to its matching closer, or `None` when the
/// span is unbalanced or mismatched
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut expected: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (index, &byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => expected.push(b'}'),
            b'[' => expected.push(b']'),
            b'}' | b']' => {
                if expected.pop() != Some(byte) {
                    return None;
                }
                if expected.is_empty() {
                    return Some(index);
                }
            }
            _ => {}
        }
    }

    None
}
