//! `${...}` expression scanner.
//!
//! Finds every expression marker in a string in a single left-to-right pass.
//! Braces nest, so `${merge({a: 1}, {b: 2})}` is one match. Braces inside
//! quoted string literals of the expression body do not count.
//!
//! The scanner never fails: an unterminated `${` ends the scan and the rest of
//! the string is left as literal text.

const OPEN: &str = "${";

/// One `${...}` occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpressionMatch<'a> {
    /// The marker including delimiters, e.g. `${a.b}`.
    pub full_expr: &'a str,
    /// The expression body, e.g. `a.b`.
    pub inner_expr: &'a str,
    /// Byte offset of `$` in the scanned string.
    pub start: usize,
    /// Byte offset one past the closing `}`.
    pub end: usize,
}

/// Locate every expression marker in `s`, in order, without overlaps.
pub fn find_expressions(s: &str) -> Vec<ExpressionMatch<'_>> {
    let mut matches = Vec::new();
    let mut offset = 0;
    while let Some(pos) = s[offset..].find(OPEN) {
        let start = offset + pos;
        let body = start + OPEN.len();
        let Some(close) = closing_brace(&s.as_bytes()[body..]) else {
            break;
        };
        let end = body + close + 1;
        matches.push(ExpressionMatch {
            full_expr: &s[start..end],
            inner_expr: &s[body..body + close],
            start,
            end,
        });
        offset = end;
    }
    matches
}

/// Index of the `}` that balances the already consumed `{`.
fn closing_brace(body: &[u8]) -> Option<usize> {
    let mut depth = 1usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    for (i, &b) in body.iter().enumerate() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
