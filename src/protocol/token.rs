use std::borrow::Cow;

use crate::error::ProtocolError;

/**
 * One step of scanning a buffer for the next token
 */
#[derive(Debug, PartialEq, Eq)]
pub enum Split<'a> {
    /// Token found; `advance` bytes of the buffer have been consumed
    Token { advance: usize, token: &'a [u8] },
    /// Token may continue past the end of the buffer
    NeedMore,
    /// Only whitespace remains and no more input will arrive
    End,
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

/**
 * Scans the next token off the front of `data`.
 * A token is either a run of non-whitespace bytes or a double-quoted string
 * (quotes stripped, embedded whitespace kept). `at_eof` tells whether the
 * buffer holds all remaining input.
 */
pub fn split(data: &[u8], at_eof: bool) -> Result<Split<'_>, ProtocolError> {
    let start = match data.iter().position(|b| !is_space(*b)) {
        Some(start) => start,
        None if at_eof => return Ok(Split::End),
        None => return Ok(Split::NeedMore),
    };

    if data[start] == b'"' {
        let body = &data[start + 1..];
        return match body.iter().position(|b| *b == b'"') {
            // Both quotes are consumed
            Some(close) => Ok(Split::Token { advance: start + close + 2, token: &body[..close] }),
            None if at_eof => Err(ProtocolError::UnterminatedQuote),
            None => Ok(Split::NeedMore),
        };
    }

    match data[start..].iter().position(|b| is_space(*b)) {
        Some(len) => Ok(Split::Token { advance: start + len, token: &data[start..start + len] }),
        None if at_eof => Ok(Split::Token { advance: data.len(), token: &data[start..] }),
        None => Ok(Split::NeedMore),
    }
}

/**
 * Splits one complete protocol line into its tokens
 */
pub fn tokenize(line: &str) -> Result<Vec<String>, ProtocolError> {
    let data = line.as_bytes();
    let mut tokens = vec![];
    let mut pos = 0;

    while let Split::Token { advance, token } = split(&data[pos..], true)? {
        tokens.push(String::from_utf8_lossy(token).into_owned());
        pos += advance;
    }

    Ok(tokens)
}

/**
 * Quotes a token for the wire if it would otherwise not survive tokenizing
 */
pub fn quote(token: &str) -> Cow<'_, str> {
    if token.is_empty() || token.bytes().any(is_space) {
        Cow::Owned(format!("\"{}\"", token))
    } else {
        Cow::Borrowed(token)
    }
}
