use super::token::quote;
use crate::error::{Error, Result};

/**
 * A fully parsed server reply
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,                         // "OK"
    Value(String),              // "<PREFIX> <VALUE>"
    List(Vec<Vec<String>>),     // "BEGIN LIST <PREFIX>" .. "END LIST <PREFIX>"
    Error(String),              // "ERR <REASON>"
}

impl Reply {
    /**
     * Server errors are ordinary replies on the wire but failures to the caller
     */
    pub fn into_result(self) -> Result<Reply> {
        match self {
            Reply::Error(reason) => Err(Error::Server(reason)),
            reply => Ok(reply),
        }
    }

    /**
     * Serialises the reply the way a server would send it after echoing `prefix`
     */
    pub fn to_lines<P: AsRef<str>>(&self, prefix: &[P]) -> Vec<String> {
        match self {
            Reply::Ok => vec!["OK".to_owned()],
            Reply::Error(reason) => vec![format!("ERR {}", reason)],
            Reply::Value(value) => vec![echo(prefix, &[value.as_str()])],
            Reply::List(rows) => {
                let mut lines = vec![format!("BEGIN LIST {}", echo(prefix, &[]))];
                for row in rows {
                    let row: Vec<&str> = row.iter().map(String::as_str).collect();
                    lines.push(echo(prefix, &row));
                }
                lines.push(format!("END LIST {}", echo(prefix, &[])));
                lines
            }
        }
    }
}

fn echo<P: AsRef<str>>(prefix: &[P], rest: &[&str]) -> String {
    prefix.iter()
        .map(|p| quote(p.as_ref()).into_owned())
        .chain(rest.iter().map(|r| quote(r).into_owned()))
        .collect::<Vec<_>>()
        .join(" ")
}
