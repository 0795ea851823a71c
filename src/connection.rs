use std::io;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{ProtocolError, Result};
use crate::protocol::{Reply, ReplyParser, Request};

/// Longest reply line accepted before the server is considered broken
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/**
 * A single NUT session: one stream plus the line buffer reading from it.
 * Any error returned by `send` leaves the connection unusable.
 */
pub struct Connection<S = TcpStream> {
    stream: S,
    buffer: BytesMut,
    /// Bytes of `buffer` already known to hold no newline
    scanned: usize,
}

impl Connection<TcpStream> {
    /**
     * Dials `addr`, giving up after `limit`
     */
    pub async fn connect(addr: &str, limit: Duration) -> Result<Self> {
        let stream = timeout(limit, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, format!("connecting to {} timed out", addr)))??;
        stream.set_nodelay(true)?;

        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(stream: S) -> Self {
        Self { stream, buffer: BytesMut::with_capacity(4 * 1024), scanned: 0 }
    }

    /**
     * Writes one command and reads lines until its reply is complete
     */
    pub async fn send(&mut self, request: &Request) -> Result<Reply> {
        let frame = request.encode();
        debug!("Sending: {:?}", request.to_line());
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;

        let mut parser = ReplyParser::new(request);
        loop {
            let line = self.read_line().await?;
            if let Some(reply) = parser.feed(&line)? {
                debug!("Reply: {:?}", reply);
                return Ok(reply)
            }
        }
    }

    /**
     * Shuts down the write half so the server sees a clean close
     */
    pub async fn close(mut self) {
        if let Err(err) = self.stream.shutdown().await {
            warn!("failed to shut down connection cleanly: {}", err);
        }
    }

    async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
                let end = self.scanned + offset;
                let line = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
                self.buffer.advance(end + 1);
                self.scanned = 0;
                return Ok(line)
            }

            self.scanned = self.buffer.len();
            if self.scanned > MAX_LINE_LENGTH {
                return Err(ProtocolError::LineTooLong { limit: MAX_LINE_LENGTH }.into())
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "server closed the connection").into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Connection, MAX_LINE_LENGTH};
    use crate::error::{Error, ProtocolError};
    use crate::protocol::{Reply, Request};
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /**
     * Server end of a duplex pipe that answers each command with canned lines
     */
    async fn serve(stream: DuplexStream, script: Vec<(&'static str, &'static str)>) {
        let mut stream = BufReader::new(stream);
        for (expected, reply) in script {
            let mut line = String::new();
            stream.read_line(&mut line).await.unwrap();
            assert_eq!(expected, line.trim_end());
            stream.get_mut().write_all(reply.as_bytes()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn should_send_get_and_parse_value() {
        let (client, server) = duplex(1024);
        let server = tokio::spawn(serve(server, vec![
            ("GET VAR ups ups.status", "VAR ups ups.status \"OL\"\n"),
        ]));

        let mut conn = Connection::new(client);
        let reply = conn.send(&Request::get(["VAR", "ups", "ups.status"])).await.unwrap();

        assert_eq!(Reply::Value("OL".to_owned()), reply);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn should_read_multi_line_list_with_crlf() {
        let (client, server) = duplex(1024);
        let server = tokio::spawn(serve(server, vec![
            ("LIST VAR ups", "BEGIN LIST VAR ups\r\nVAR ups ups.status \"OB\"\r\nEND LIST VAR ups\r\n"),
        ]));

        let mut conn = Connection::new(client);
        let reply = conn.send(&Request::list(["VAR", "ups"])).await.unwrap();

        assert_eq!(Reply::List(vec![vec!["ups.status".to_owned(), "OB".to_owned()]]), reply);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn should_run_consecutive_commands() {
        let (client, server) = duplex(1024);
        let server = tokio::spawn(serve(server, vec![
            ("INSTCMD ups beeper.mute", "OK\n"),
            ("GET VAR nope ups.status", "ERR UNKNOWN-UPS\n"),
        ]));

        let mut conn = Connection::new(client);
        assert_eq!(Reply::Ok, conn.send(&Request::run("INSTCMD", ["ups", "beeper.mute"])).await.unwrap());
        assert_eq!(
            Reply::Error("UNKNOWN-UPS".to_owned()),
            conn.send(&Request::get(["VAR", "nope", "ups.status"])).await.unwrap()
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn should_fail_when_server_closes_mid_reply() {
        let (client, server) = duplex(1024);
        tokio::spawn(async move {
            let mut server = BufReader::new(server);
            let mut line = String::new();
            server.read_line(&mut line).await.unwrap();
            server.get_mut().write_all(b"BEGIN LIST VAR ups\n").await.unwrap();
        });

        let mut conn = Connection::new(client);
        let err = conn.send(&Request::list(["VAR", "ups"])).await.unwrap_err();

        assert!(matches!(err, Error::Transport(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof), "{:?}", err);
    }

    #[tokio::test]
    async fn should_read_line_split_across_writes() {
        let (client, server) = duplex(16);
        tokio::spawn(async move {
            let mut server = BufReader::new(server);
            let mut line = String::new();
            server.read_line(&mut line).await.unwrap();
            for chunk in ["VAR ups ", "ups.status ", "\"OB DISCHRG\"", "\n"] {
                server.get_mut().write_all(chunk.as_bytes()).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let mut conn = Connection::new(client);
        let reply = conn.send(&Request::get(["VAR", "ups", "ups.status"])).await.unwrap();

        assert_eq!(Reply::Value("OB DISCHRG".to_owned()), reply);
    }

    #[tokio::test]
    async fn should_reject_unterminated_oversized_line() {
        let (client, server) = duplex(8 * 1024);
        tokio::spawn(async move {
            let mut server = BufReader::new(server);
            let mut line = String::new();
            server.read_line(&mut line).await.unwrap();
            let chunk = [b'x'; 1024];
            // Stops once the client hangs up
            while server.get_mut().write_all(&chunk).await.is_ok() {}
        });

        let mut conn = Connection::new(client);
        let err = conn.send(&Request::get(["VAR", "ups", "ups.status"])).await.unwrap_err();

        assert!(
            matches!(err, Error::Protocol(ProtocolError::LineTooLong { limit: MAX_LINE_LENGTH })),
            "{:?}",
            err
        );
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn should_surface_malformed_reply_as_protocol_error() {
        let (client, server) = duplex(1024);
        tokio::spawn(serve(server, vec![
            ("GET VAR ups ups.status", "VAR ups ups.status \"OL\n"),
        ]));

        let mut conn = Connection::new(client);
        let err = conn.send(&Request::get(["VAR", "ups", "ups.status"])).await.unwrap_err();

        assert!(matches!(err, Error::Protocol(ProtocolError::UnterminatedQuote)), "{:?}", err);
    }
}
