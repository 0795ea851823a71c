use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use nut_client::config::{DEFAULT_ADDR, DEFAULT_NAME};
use nut_client::protocol::{quote, tokenize};
use nut_client::{Client, Config, Monitor, MonitorConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Query and monitor a NUT server", long_about = None)]
struct Cli {
    #[command(flatten)]
    server: ServerArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct ServerArgs {
    /// Address of the NUT server
    #[arg(long, default_value = DEFAULT_ADDR)]
    addr: String,

    /// Name of the UPS
    #[arg(long, default_value = DEFAULT_NAME)]
    name: String,

    /// Seconds between reconnect attempts, also used as the dial timeout
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    reconnect_interval: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Query(Query),
    /// Log power events until interrupted
    Monitor {
        #[arg(long, default_value_t = 30)]
        poll_interval: u64,
    },
}

#[derive(Subcommand, Debug)]
enum Query {
    /// Print a single value, e.g. `get VAR ups ups.status`
    Get { path: Vec<String> },
    /// Print every row of a list, e.g. `list VAR ups`
    List { path: Vec<String> },
    /// Run a command answered with OK, e.g. `run INSTCMD "ups beeper.mute"`
    Run {
        name: String,
        /// Arguments as one protocol line; quote values containing spaces
        #[arg(default_value = "")]
        args: String,
    },
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Monitor { poll_interval } => monitor(&cli.server, poll_interval).await,
        Command::Query(query) => run(&cli.server, query).await,
    }
}

async fn run(server: &ServerArgs, query: Query) -> Result<()> {
    let reconnect_interval = Duration::from_secs(server.reconnect_interval);
    let client = Client::new(
        Config::new()
            .with_addr(server.addr.as_str())
            .with_name(server.name.as_str())
            .with_reconnect_interval(reconnect_interval),
    );

    let result = run_query(&client, reconnect_interval, query).await;
    client.close().await;
    result
}

async fn run_query(client: &Client, limit: Duration, query: Query) -> Result<()> {
    client.wait_connected(limit)
        .await
        .with_context(|| format!("failed to connect to {}", client.endpoint().addr))?;

    match query {
        Query::Get { path } => {
            let value = client.get(path).await.context("GET failed")?;
            println!("{}", value);
        },
        Query::List { path } => {
            for row in client.list(path).await.context("LIST failed")? {
                let row: Vec<_> = row.iter().map(|field| quote(field)).collect();
                println!("{}", row.join(" "));
            }
        },
        Query::Run { name, args } => {
            let args = tokenize(&args).context("invalid arguments")?;
            client.run_command(&name, args).await.with_context(|| format!("{} failed", name))?;
            println!("OK");
        },
    }

    Ok(())
}

async fn monitor(server: &ServerArgs, poll_interval: u64) -> Result<()> {
    let addr = server.addr.clone();
    let monitor = Monitor::new(
        MonitorConfig::new()
            .with_addr(server.addr.as_str())
            .with_name(server.name.as_str())
            .with_reconnect_interval(Duration::from_secs(server.reconnect_interval))
            .with_poll_interval(Duration::from_secs(poll_interval))
            .on_connected(move || info!("connected to {}", addr))
            .on_disconnected(|| warn!("connection lost"))
            .on_power_lost(|| warn!("POWER LOST: running on battery"))
            .on_power_restored(|| info!("power restored")),
    );

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutting down");
    monitor.close().await;

    Ok(())
}
