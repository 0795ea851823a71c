use tracing::debug;

use super::{command::Request, reply::Reply, token::tokenize};
use crate::error::ProtocolError;

enum ParseState {
    Start,
    Rows(Vec<Vec<String>>),
}

/**
 * Incremental parser for the reply to a single request.
 * Lines are fed one at a time until a complete reply is produced.
 */
pub struct ReplyParser<'r> {
    request: &'r Request,
    state: ParseState,
}

impl<'r> ReplyParser<'r> {
    pub fn new(request: &'r Request) -> Self {
        Self { request, state: ParseState::Start }
    }

    /**
     * Returns the reply once `line` completes it, `None` while more lines are expected
     */
    pub fn feed(&mut self, line: &str) -> Result<Option<Reply>, ProtocolError> {
        debug!("Read line: {:?}", line);
        let tokens = tokenize(line)?;

        match &mut self.state {
            ParseState::Start => self.parse_first(tokens),
            ParseState::Rows(rows) => {
                let prefix = self.request.prefix();
                let is_end = tokens.first()
                    .map_or(false, |t| t.eq_ignore_ascii_case("END"));

                if is_end {
                    strip_prefix(tokens, &list_marker("END", prefix))?;
                    Ok(Some(Reply::List(std::mem::take(rows))))
                } else {
                    rows.push(strip_prefix(tokens, prefix)?);
                    Ok(None)
                }
            }
        }
    }

    /**
     * Parses a reply that has been fully buffered
     */
    pub fn parse_all<'a, I>(request: &'r Request, lines: I) -> Result<Reply, ProtocolError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut parser = Self::new(request);
        for line in lines {
            if let Some(reply) = parser.feed(line)? {
                return Ok(reply)
            }
        }
        Err(ProtocolError::UnexpectedEnd)
    }

    fn parse_first(&mut self, tokens: Vec<String>) -> Result<Option<Reply>, ProtocolError> {
        if let [first, reason @ ..] = tokens.as_slice() {
            if first.eq_ignore_ascii_case("ERR") {
                return Ok(Some(Reply::Error(reason.join(" "))))
            }
        }

        match self.request {
            Request::Get(prefix) => {
                let value = strip_prefix(tokens, prefix)?;
                if value.is_empty() {
                    return Err(ProtocolError::MissingValue)
                }
                Ok(Some(Reply::Value(value.join(" "))))
            },
            Request::List(prefix) => {
                strip_prefix(tokens, &list_marker("BEGIN", prefix))?;
                self.state = ParseState::Rows(vec![]);
                Ok(None)
            },
            Request::Run { .. } => {
                strip_prefix(tokens, &["OK"])?;
                Ok(Some(Reply::Ok))
            },
            Request::NoOp(_) => {
                if tokens.is_empty() {
                    return Err(ProtocolError::MissingValue)
                }
                Ok(Some(Reply::Value(tokens.join(" "))))
            },
        }
    }
}

fn list_marker<'a>(marker: &'a str, prefix: &'a [String]) -> Vec<&'a str> {
    [marker, "LIST"].into_iter()
        .chain(prefix.iter().map(String::as_str))
        .collect()
}

/**
 * Drops the echoed `prefix` from the start of `tokens`, comparing case-insensitively
 */
fn strip_prefix<P: AsRef<str>>(mut tokens: Vec<String>, prefix: &[P]) -> Result<Vec<String>, ProtocolError> {
    let matches = tokens.len() >= prefix.len()
        && tokens.iter().zip(prefix).all(|(t, p)| t.eq_ignore_ascii_case(p.as_ref()));

    if !matches {
        let expected = prefix.iter().map(AsRef::as_ref).collect::<Vec<&str>>().join(" ");
        return Err(ProtocolError::UnexpectedPrefix { expected })
    }

    Ok(tokens.split_off(prefix.len()))
}
