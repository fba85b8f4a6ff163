// Lexical comment detection for matched source text.
// Only string, character and text-block literals need to be skipped; any
// other `//` or `/*` starts a comment.

/// Whether `text` contains a line or block comment outside of literals.
pub fn contains_comment(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if matches!(bytes.get(i + 1), Some(b'/') | Some(b'*')) => return true,
            b'"' if bytes[i..].starts_with(b"\"\"\"") => i = skip_text_block(bytes, i + 3),
            quote @ (b'"' | b'\'') => i = skip_literal(bytes, i + 1, quote),
            _ => i += 1,
        }
    }
    false
}

fn skip_literal(bytes: &[u8], mut i: usize, quote: u8) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            // Unterminated literal ends at the line end.
            b'\n' => return i + 1,
            _ => i += 1,
        }
    }
    i
}

fn skip_text_block(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
        } else if bytes[i..].starts_with(b"\"\"\"") {
            return i + 3;
        } else {
            i += 1;
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_comments() {
        assert!(contains_comment("foo(/* inline */ x)"));
        assert!(contains_comment("foo(x) // trailing"));
        assert!(!contains_comment("a / b"));
        assert!(!contains_comment("x.y()"));
    }

    #[test]
    fn test_ignores_comment_markers_in_literals() {
        assert!(!contains_comment(r#"String.valueOf("http://example.com")"#));
        assert!(!contains_comment(r#"f('/', "\"/*")"#));
        assert!(!contains_comment("\"\"\"\n  /* not a comment */\n\"\"\""));
        assert!(contains_comment(r#"f("a") /* b */"#));
    }
}
