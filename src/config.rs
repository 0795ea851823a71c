use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_ADDR: &str = "localhost:3493";
pub const DEFAULT_NAME: &str = "ups";
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_KEEP_ALIVE_COMMAND: &str = "VER";

pub type Callback = Arc<dyn Fn() + Send + Sync>;

/**
 * Server address and the UPS the client talks about
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub addr: String,
    pub name: String,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self { addr: DEFAULT_ADDR.to_owned(), name: DEFAULT_NAME.to_owned() }
    }
}

/**
 * Client settings and event callbacks. Fixed once the client is created.
 */
#[derive(Clone)]
pub struct Config {
    pub endpoint: Endpoint,
    /// Dial timeout and delay between reconnect attempts
    pub reconnect_interval: Duration,
    /// Idle time after which a no-op is sent; `None` disables keep-alive
    pub keep_alive_interval: Option<Duration>,
    pub keep_alive_command: String,
    pub on_connected: Option<Callback>,
    pub on_disconnected: Option<Callback>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            keep_alive_interval: None,
            keep_alive_command: DEFAULT_KEEP_ALIVE_COMMAND.to_owned(),
            on_connected: None,
            on_disconnected: None,
        }
    }
}

impl Config {
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

    /// A zero interval falls back to the default
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = if interval.is_zero() { DEFAULT_RECONNECT_INTERVAL } else { interval };
        self
    }

    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval).filter(|i| !i.is_zero());
        self
    }

    pub fn with_keep_alive_command(mut self, command: impl Into<String>) -> Self {
        self.keep_alive_command = command.into();
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

    pub(crate) fn notify_connected(&self) {
        if let Some(f) = &self.on_connected {
            f()
        }
    }

    pub(crate) fn notify_disconnected(&self) {
        if let Some(f) = &self.on_disconnected {
            f()
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("keep_alive_command", &self.keep_alive_command)
            .finish_non_exhaustive()
    }
}
