//! Single-line rendering of untrusted strings (user ids, request bodies) for logs.

/// Longest user id echoed into a log line.
const MAX_ID_PREVIEW: usize = 64;

/// Escape a user-supplied identifier for logging. See [`preview`].
pub fn escape_log(s: &str) -> String {
    preview(s, MAX_ID_PREVIEW)
}

/// Escape control characters and backslashes so `s` stays on one log line,
/// truncating after `max_chars` characters with an ellipsis.
pub fn preview(s: &str, max_chars: usize) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(s.len().min(max_chars) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= max_chars {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_characters() {
        assert_eq!(escape_log("bob\nINFO forged"), "bob\\nINFO forged");
        assert_eq!(escape_log("a\\b\t\u{7}"), "a\\\\b\\t\\x07");
    }

    #[test]
    fn truncates_long_input() {
        let long = "x".repeat(100);
        let out = escape_log(&long);
        assert_eq!(out.chars().count(), MAX_ID_PREVIEW + 1);
        assert!(out.ends_with('…'));
        assert_eq!(preview("abcdef", 3), "abc…");
    }
}
