use bytes::{BufMut, Bytes, BytesMut};

use super::token::quote;

/**
 * NUT commands issued by the client
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `GET <path>`, e.g. `GET VAR ups ups.status`
    Get(Vec<String>),
    /// `LIST <path>`, e.g. `LIST VAR ups`
    List(Vec<String>),
    /// Fire-and-forget command answered with `OK`, e.g. `INSTCMD ups beeper.toggle`
    Run { name: String, args: Vec<String> },
    /// Keep-alive; any single-line reply will do
    NoOp(String),
}

impl Request {
    pub fn get<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Get(path.into_iter().map(Into::into).collect())
    }

    pub fn list<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(path.into_iter().map(Into::into).collect())
    }

    pub fn run<I, S>(name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Run { name: name.to_owned(), args: args.into_iter().map(Into::into).collect() }
    }

    /**
     * Tokens the server echoes back at the start of each reply line
     */
    pub fn prefix(&self) -> &[String] {
        match self {
            Request::Get(path) | Request::List(path) => path.as_slice(),
            Request::Run { .. } | Request::NoOp(_) => &[],
        }
    }

    /**
     * Command line as sent, without the line terminator
     */
    pub fn to_line(&self) -> String {
        let (command, args): (&str, &[String]) = match self {
            Request::Get(path) => ("GET", path.as_slice()),
            Request::List(path) => ("LIST", path.as_slice()),
            Request::Run { name, args } => (name.as_str(), args.as_slice()),
            Request::NoOp(command) => (command.as_str(), &[][..]),
        };

        let mut line = command.to_owned();
        for arg in args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        line
    }

    /**
     * Newline-terminated wire encoding
     */
    pub fn encode(&self) -> Bytes {
        let line = self.to_line();
        let mut buf = BytesMut::with_capacity(line.len() + 1);
        buf.put_slice(line.as_bytes());
        buf.put_u8(b'\n');
        buf.freeze()
    }
}
