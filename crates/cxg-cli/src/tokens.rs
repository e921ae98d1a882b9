//! Token stream input: one token per line, `TYPE:value` or `TYPE value`.
//! Blank lines and `#` comments are skipped.

use std::io::{self, BufRead};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub element_type: String,
    pub value: String,
}

pub fn parse_line(line: &str) -> Option<Token> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let colon = line.find(':');
    let space = line.find(char::is_whitespace);
    let (ty, value) = match (colon, space) {
        (Some(c), Some(s)) if c < s => (&line[..c], &line[c + 1..]),
        (Some(c), None) => (&line[..c], &line[c + 1..]),
        (_, Some(s)) => (&line[..s], &line[s..]),
        (None, None) => (line, ""),
    };
    let ty = ty.trim();
    if ty.is_empty() {
        return None;
    }
    Some(Token {
        element_type: ty.to_string(),
        value: value.trim().to_string(),
    })
}

/// Lazily read tokens, one line at a time, so input can be processed as it
/// arrives. Lines without a type are logged and skipped.
pub fn tokens<R: BufRead>(reader: R) -> impl Iterator<Item = io::Result<Token>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(n, line)| match line {
            Err(err) => Some(Err(err)),
            Ok(line) => {
                let token = parse_line(&line);
                let trimmed = line.trim();
                if token.is_none() && !trimmed.is_empty() && !trimmed.starts_with('#') {
                    tracing::warn!(line = n + 1, "skipping token line without a type: {trimmed:?}");
                }
                token.map(Ok)
            }
        })
}
