//! Reconnecting NUT client.
//!
//! A [`Client`] owns one background task that dials the server, serves
//! requests over the single connection one at a time and redials after the
//! reconnect interval whenever the connection fails.

mod dispatcher;
mod lifecycle;

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::sleep;
use tracing::debug;

use self::dispatcher::Envelope;
use self::lifecycle::Lifecycle;
use crate::config::{Config, Endpoint};
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{Reply, Request};

const REQUEST_QUEUE: usize = 64;

/**
 * Handle to a running client. Dropping it stops the background task
 * without waiting; use `close` to wait for it.
 */
pub struct Client {
    endpoint: Endpoint,
    requests: mpsc::Sender<Envelope>,
    shutdown: watch::Sender<bool>,
    connected: watch::Receiver<bool>,
    closed: watch::Receiver<bool>,
}

impl Client {
    /**
     * Starts connecting in the background.
     * Must be called from within a tokio runtime.
     */
    pub fn new(config: Config) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (connected_tx, connected_rx) = watch::channel(false);
        let (closed_tx, closed_rx) = watch::channel(false);
        let endpoint = config.endpoint.clone();

        let lifecycle = Lifecycle::new(config, requests_rx, shutdown_rx, connected_tx, closed_tx);
        tokio::spawn(lifecycle.run());

        Self {
            endpoint,
            requests: requests_tx,
            shutdown: shutdown_tx,
            connected: connected_rx,
            closed: closed_rx,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /**
     * Reads a single value, e.g. `get(["VAR", "ups", "ups.status"])`
     */
    pub async fn get<I, S>(&self, path: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self.request(Request::get(path)).await? {
            Reply::Value(value) => Ok(value),
            reply => Err(mismatch("value", reply)),
        }
    }

    /**
     * Reads every row of a list, e.g. `list(["VAR", "ups"])` yields `[name, value]` rows
     */
    pub async fn list<I, S>(&self, path: I) -> Result<Vec<Vec<String>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self.request(Request::list(path)).await? {
            Reply::List(rows) => Ok(rows),
            reply => Err(mismatch("BEGIN LIST", reply)),
        }
    }

    /**
     * Runs a command answered with `OK`, e.g. `run_command("INSTCMD", ["ups", "beeper.mute"])`
     */
    pub async fn run_command<I, S>(&self, name: &str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self.request(Request::run(name, args)).await? {
            Reply::Ok => Ok(()),
            reply => Err(mismatch("OK", reply)),
        }
    }

    /**
     * Waits until the client is serving. Fails with `NotConnected` after `limit`
     * or `Canceled` once the client has closed.
     */
    pub async fn wait_connected(&self, limit: Duration) -> Result<()> {
        let mut connected = self.connected.clone();
        let mut closed = self.closed.clone();

        tokio::select! {
            result = connected.wait_for(|c| *c) => result.map(|_| ()).map_err(|_| Error::Canceled),
            _ = closed.wait_for(|c| *c) => Err(Error::Canceled),
            _ = sleep(limit) => Err(Error::NotConnected),
        }
    }

    /**
     * Stops the client and waits for the background task to exit.
     * No callback fires once this returns. Safe to call more than once.
     */
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let mut closed = self.closed.clone();
        // Errors only if the task is already gone
        let _ = closed.wait_for(|c| *c).await;
    }

    async fn request(&self, request: Request) -> Result<Reply> {
        if *self.shutdown.borrow() {
            return Err(Error::Canceled)
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests.send(Envelope { request, reply: reply_tx })
            .await
            .map_err(|_| Error::Canceled)?;

        reply_rx.await.map_err(|_| Error::Canceled)?
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/**
 * Reply of a different shape than the request asked for
 */
fn mismatch(expected: &str, reply: Reply) -> Error {
    debug!("Reply does not match request: {:?}", reply);
    ProtocolError::UnexpectedPrefix { expected: expected.to_owned() }.into()
}
