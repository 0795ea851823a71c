use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::dispatcher::{shutdown_requested, Dispatcher, Envelope, Outcome};
use crate::config::Config;
use crate::connection::Connection;
use crate::error::Error;

/**
 * Background task owning the connection.
 * Connecting -> Serving -> Backoff -> Connecting ... until shutdown moves it to Closed.
 */
pub(crate) struct Lifecycle {
    config: Config,
    requests: mpsc::Receiver<Envelope>,
    shutdown: watch::Receiver<bool>,
    connected: watch::Sender<bool>,
    closed: watch::Sender<bool>,
}

impl Lifecycle {
    pub fn new(
        config: Config,
        requests: mpsc::Receiver<Envelope>,
        shutdown: watch::Receiver<bool>,
        connected: watch::Sender<bool>,
        closed: watch::Sender<bool>,
    ) -> Self {
        Self { config, requests, shutdown, connected, closed }
    }

    pub async fn run(mut self) {
        loop {
            let Some(dialed) = self.connect().await else { break };

            match dialed {
                Ok(conn) => {
                    if self.serve(conn).await {
                        break
                    }
                },
                Err(err) => warn!("unable to connect to {}: {}", self.config.endpoint.addr, err),
            }

            if !self.backoff().await {
                break
            }
        }

        self.cancel_pending();
        self.closed.send_replace(true);
        debug!("Client closed");
    }

    /**
     * Dials the server; `None` if shutdown was requested first
     */
    async fn connect(&mut self) -> Option<Result<Connection, Error>> {
        let addr = &self.config.endpoint.addr;
        debug!("Connecting to {}", addr);

        tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown) => None,
            dialed = Connection::connect(addr, self.config.reconnect_interval) => Some(dialed),
        }
    }

    /**
     * Serves requests on a fresh connection; returns true if the client is shutting down
     */
    async fn serve(&mut self, mut conn: Connection) -> bool {
        info!("connected to {}", self.config.endpoint.addr);
        self.connected.send_replace(true);
        self.config.notify_connected();

        let outcome = Dispatcher::new(&mut conn, &mut self.requests, &mut self.shutdown)
            .with_keep_alive(self.config.keep_alive_interval, &self.config.keep_alive_command)
            .serve()
            .await;
        self.connected.send_replace(false);

        match outcome {
            Outcome::Shutdown => {
                conn.close().await;
                true
            },
            Outcome::Failed(err) => {
                warn!("disconnected from {}: {}", self.config.endpoint.addr, err);
                self.config.notify_disconnected();
                false
            },
        }
    }

    /**
     * Waits out the reconnect interval, turning away requests meanwhile.
     * Returns false if shutdown was requested.
     */
    async fn backoff(&mut self) -> bool {
        debug!("Reconnecting in {:?}", self.config.reconnect_interval);
        let delay = sleep(self.config.reconnect_interval);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => return false,
                _ = &mut delay => return true,
                Some(envelope) = self.requests.recv() => envelope.respond(Err(Error::NotConnected)),
            }
        }
    }

    /**
     * Every queued request still gets an answer
     */
    fn cancel_pending(&mut self) {
        self.requests.close();
        while let Ok(envelope) = self.requests.try_recv() {
            envelope.respond(Err(Error::Canceled));
        }
    }
}
