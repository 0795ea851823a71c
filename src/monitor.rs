//! Power event monitor.
//!
//! Polls `ups.status` through a [`Client`] while connected and turns changes
//! of the "on battery" state into power lost / power restored callbacks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::client::Client;
use crate::config::{Callback, Config, Endpoint, DEFAULT_RECONNECT_INTERVAL};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub type StatusFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/**
 * Default "on battery" test: anything not reporting `OL` (online) is on battery
 */
pub fn default_on_battery(status: &str) -> bool {
    !status.split(' ').any(|flag| flag == "OL")
}

#[derive(Clone)]
pub struct MonitorConfig {
    pub endpoint: Endpoint,
    pub reconnect_interval: Duration,
    pub poll_interval: Duration,
    pub on_connected: Option<Callback>,
    pub on_disconnected: Option<Callback>,
    pub on_power_lost: Option<Callback>,
    pub on_power_restored: Option<Callback>,
    /// Decides from the raw `ups.status` value whether the UPS runs on battery
    pub evaluate_status: Option<StatusFn>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            on_connected: None,
            on_disconnected: None,
            on_power_lost: None,
            on_power_restored: None,
            evaluate_status: None,
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.endpoint.addr = addr.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.endpoint.name = name.into();
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// A zero interval falls back to the default
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = if interval.is_zero() { DEFAULT_POLL_INTERVAL } else { interval };
        self
    }

    pub fn on_connected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connected = Some(Arc::new(f));
        self
    }

    pub fn on_disconnected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnected = Some(Arc::new(f));
        self
    }

    pub fn on_power_lost(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_power_lost = Some(Arc::new(f));
        self
    }

    pub fn on_power_restored(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_power_restored = Some(Arc::new(f));
        self
    }

    pub fn with_status_evaluator(mut self, f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.evaluate_status = Some(Arc::new(f));
        self
    }

    fn is_on_battery(&self, status: &str) -> bool {
        match &self.evaluate_status {
            Some(f) => f(status),
            None => default_on_battery(status),
        }
    }
}

impl fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("endpoint", &self.endpoint)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

fn notify(callback: &Option<Callback>) {
    if let Some(f) = callback {
        f()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    Lost,
    Restored,
}

/**
 * Edge detector over successive "on battery" readings; starts on line power
 */
#[derive(Debug, Default)]
pub struct PowerState {
    on_battery: bool,
}

impl PowerState {
    pub fn update(&mut self, on_battery: bool) -> Option<PowerEvent> {
        let event = match (self.on_battery, on_battery) {
            (false, true) => Some(PowerEvent::Lost),
            (true, false) => Some(PowerEvent::Restored),
            _ => None,
        };
        self.on_battery = on_battery;
        event
    }
}

/**
 * Watches a UPS for power events until closed
 */
pub struct Monitor {
    client: Arc<Client>,
    stop: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    /**
     * Starts the client and the polling task.
     * Must be called from within a tokio runtime.
     */
    pub fn new(config: MonitorConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connected_tx = events_tx.clone();

        let client_config = Config::new()
            .with_addr(config.endpoint.addr.clone())
            .with_name(config.endpoint.name.clone())
            .with_reconnect_interval(config.reconnect_interval)
            .on_connected(move || { let _ = connected_tx.send(true); })
            .on_disconnected(move || { let _ = events_tx.send(false); });
        let client = Arc::new(Client::new(client_config));

        let (stop_tx, stop_rx) = watch::channel(false);
        let poller = Poller {
            client: Arc::clone(&client),
            config,
            events: events_rx,
            stop: stop_rx,
            power: PowerState::default(),
        };

        Self {
            client,
            stop: stop_tx,
            task: Mutex::new(Some(tokio::spawn(poller.run()))),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /**
     * Closes the client, then stops polling. No callback fires once this returns.
     */
    pub async fn close(&self) {
        self.client.close().await;
        self.stop.send_replace(true);

        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}

struct Poller {
    client: Arc<Client>,
    config: MonitorConfig,
    events: mpsc::UnboundedReceiver<bool>,
    stop: watch::Receiver<bool>,
    power: PowerState,
}

impl Poller {
    async fn run(mut self) {
        let mut connected = false;
        let timer = sleep(Duration::ZERO);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;

                _ = stopped(&mut self.stop) => return,

                event = self.events.recv() => match event {
                    Some(true) => {
                        connected = true;
                        notify(&self.config.on_connected);
                        // Poll straight away on every new connection
                        timer.as_mut().reset(Instant::now());
                    },
                    Some(false) => {
                        connected = false;
                        notify(&self.config.on_disconnected);
                    },
                    None => return,
                },

                _ = &mut timer, if connected => {
                    self.poll().await;
                    timer.as_mut().reset(Instant::now() + self.config.poll_interval);
                },
            }
        }
    }

    async fn poll(&mut self) {
        let name = self.config.endpoint.name.as_str();
        let status = match self.client.get(["VAR", name, "ups.status"]).await {
            Ok(status) => status,
            Err(err) => {
                debug!("Status poll failed: {}", err);
                return
            }
        };

        match self.power.update(self.config.is_on_battery(&status)) {
            Some(PowerEvent::Lost) => {
                info!("power lost ({})", status);
                notify(&self.config.on_power_lost);
            },
            Some(PowerEvent::Restored) => {
                info!("power restored ({})", status);
                notify(&self.config.on_power_restored);
            },
            None => {},
        }
    }
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}
