#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Instant};

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/**
 * What the fake server does with one command line
 */
pub enum Action {
    Reply(Vec<String>),
    Delay(Duration, Vec<String>),
    /// Never answer
    Stall,
    /// Drop the connection without answering
    Close,
}

impl Action {
    pub fn lines(lines: &[&str]) -> Self {
        Action::Reply(lines.iter().map(|l| l.to_string()).collect())
    }
}

type Handler = dyn Fn(&str) -> Action + Send + Sync;

/**
 * In-process upsd stand-in that records what it was sent
 */
pub struct FakeServer {
    pub addr: String,
    pub connections: Arc<AtomicUsize>,
    pub commands: Arc<std::sync::Mutex<Vec<String>>>,
    /// Commands that arrived while another was still unanswered
    pub overlaps: Arc<AtomicUsize>,
}

impl FakeServer {
    pub async fn start(handler: impl Fn(&str) -> Action + Send + Sync + 'static) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handler: Arc<Handler> = Arc::new(handler);

        let server = Self {
            addr,
            connections: Arc::new(AtomicUsize::new(0)),
            commands: Arc::new(std::sync::Mutex::new(vec![])),
            overlaps: Arc::new(AtomicUsize::new(0)),
        };

        let connections = Arc::clone(&server.connections);
        let commands = Arc::clone(&server.commands);
        let overlaps = Arc::clone(&server.overlaps);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    socket,
                    Arc::clone(&handler),
                    Arc::clone(&commands),
                    Arc::clone(&overlaps),
                ));
            }
        });

        server
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

async fn serve(
    socket: TcpStream,
    handler: Arc<Handler>,
    commands: Arc<std::sync::Mutex<Vec<String>>>,
    overlaps: Arc<AtomicUsize>,
) {
    let mut reader = BufReader::new(socket);
    let mut line = String::new();

    while reader.read_line(&mut line).await.unwrap_or(0) > 0 {
        let command = line.trim_end().to_owned();
        line.clear();
        commands.lock().unwrap().push(command.clone());

        let reply = match handler(&command) {
            Action::Reply(reply) => reply,
            Action::Delay(delay, reply) => {
                sleep(delay).await;
                reply
            },
            Action::Stall => {
                sleep(Duration::from_secs(3600)).await;
                return
            },
            Action::Close => return,
        };

        if has_pending_input(&reader).await {
            overlaps.fetch_add(1, Ordering::SeqCst);
        }

        let mut out = reply.join("\n");
        out.push('\n');
        if reader.get_mut().write_all(out.as_bytes()).await.is_err() {
            return
        }
    }
}

async fn has_pending_input(reader: &BufReader<TcpStream>) -> bool {
    if !reader.buffer().is_empty() {
        return true
    }
    let mut byte = [0u8; 1];
    matches!(
        timeout(Duration::from_millis(1), reader.get_ref().peek(&mut byte)).await,
        Ok(Ok(n)) if n > 0
    )
}

/**
 * Address nothing is listening on
 */
pub async fn unused_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().to_string()
}

/**
 * Polls `condition` until it holds or `limit` passes
 */
pub async fn eventually(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true
        }
        sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
