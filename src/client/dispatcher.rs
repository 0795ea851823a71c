use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::{Reply, Request};

/**
 * A caller's request paired with the channel its reply goes back on
 */
pub(crate) struct Envelope {
    pub request: Request,
    pub reply: oneshot::Sender<Result<Reply>>,
}

impl Envelope {
    pub fn respond(self, result: Result<Reply>) {
        // Caller may have given up waiting
        let _ = self.reply.send(result);
    }
}

/**
 * Why the serving loop stopped
 */
#[derive(Debug)]
pub(crate) enum Outcome {
    Shutdown,
    Failed(Error),
}

/**
 * Resolves once shutdown is requested or every client handle is gone
 */
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|requested| *requested).await;
}

/**
 * Serving loop for one connection: runs caller requests and keep-alives
 * strictly one at a time until the connection fails or shutdown is requested
 */
pub(crate) struct Dispatcher<'a, S> {
    conn: &'a mut Connection<S>,
    requests: &'a mut mpsc::Receiver<Envelope>,
    shutdown: &'a mut watch::Receiver<bool>,
    keep_alive: Option<(Duration, Request)>,
}

impl<'a, S: AsyncRead + AsyncWrite + Unpin> Dispatcher<'a, S> {
    pub fn new(
        conn: &'a mut Connection<S>,
        requests: &'a mut mpsc::Receiver<Envelope>,
        shutdown: &'a mut watch::Receiver<bool>,
    ) -> Self {
        Self { conn, requests, shutdown, keep_alive: None }
    }

    pub fn with_keep_alive(mut self, interval: Option<Duration>, command: &str) -> Self {
        self.keep_alive = interval.map(|interval| (interval, Request::NoOp(command.to_owned())));
        self
    }

    pub async fn serve(mut self) -> Outcome {
        let interval = self.keep_alive.as_ref().map(|(interval, _)| *interval);
        let timer = sleep(interval.unwrap_or_default());
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(self.shutdown) => return Outcome::Shutdown,

                envelope = self.requests.recv() => {
                    let Some(envelope) = envelope else {
                        return Outcome::Shutdown
                    };
                    if let Some(outcome) = self.execute(envelope).await {
                        return outcome
                    }
                },

                _ = &mut timer, if interval.is_some() => {
                    if let Some(outcome) = self.send_keep_alive().await {
                        return outcome
                    }
                },
            }

            // Each completed exchange counts as activity
            if let Some(interval) = interval {
                timer.as_mut().reset(Instant::now() + interval);
            }
        }
    }

    /**
     * Runs one caller request; the caller always receives exactly one response
     */
    async fn execute(&mut self, envelope: Envelope) -> Option<Outcome> {
        match self.exchange(&envelope.request).await {
            None => {
                envelope.respond(Err(Error::Canceled));
                Some(Outcome::Shutdown)
            },
            Some(Err(err)) => {
                envelope.respond(Err(err.clone()));
                Some(Outcome::Failed(err))
            },
            Some(Ok(reply)) => {
                envelope.respond(reply.into_result());
                None
            },
        }
    }

    async fn send_keep_alive(&mut self) -> Option<Outcome> {
        let request = match &self.keep_alive {
            Some((_, request)) => request.clone(),
            None => return None,
        };

        trace!("Keep-alive: {:?}", request.to_line());
        match self.exchange(&request).await {
            None => Some(Outcome::Shutdown),
            Some(Err(err)) => Some(Outcome::Failed(err)),
            Some(Ok(_)) => None,
        }
    }

    /**
     * Races one round trip against shutdown; `None` means it was canceled.
     * A canceled send leaves the stream mid-exchange, so the connection must be dropped.
     */
    async fn exchange(&mut self, request: &Request) -> Option<Result<Reply>> {
        tokio::select! {
            biased;
            _ = shutdown_requested(self.shutdown) => None,
            result = self.conn.send(request) => Some(result),
        }
    }
}
