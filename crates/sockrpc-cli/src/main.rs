//! # sockrpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # One request over IPC (outputs raw JSON)
//! sockrpc call /tmp/geth.ipc eth_blockNumber
//!
//! # One request over TCP with params
//! sockrpc call tcp://127.0.0.1:8546 eth_getBalance -p '["0xabc", "latest"]'
//!
//! # Print the next 10 new heads, one JSON line each
//! sockrpc subscribe ipc:///tmp/geth.ipc eth_subscribe -p '["newHeads"]' -n 10
//! ```

use anyhow::Result;
use argh::FromArgs;
use sockrpc_cli::session::{self, SessionOptions};
use std::io::Write;
use std::time::Duration;

#[derive(FromArgs)]
/// sockrpc - JSON-RPC over persistent IPC and TCP sockets
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Call(CallArgs),
    Subscribe(SubscribeArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// send one JSON-RPC request and print the result
struct CallArgs {
    /// endpoint: tcp://host:port, ipc://path or a socket path
    #[argh(positional)]
    endpoint: String,

    /// method to invoke
    #[argh(positional)]
    method: String,

    /// params as JSON; an array is passed as is, anything else as one param
    #[argh(option, short = 'p', long = "params", default = "String::new()")]
    params: String,

    /// do not reconnect after the connection drops
    #[argh(switch, long = "no-reconnect")]
    no_reconnect: bool,

    /// delay between reconnect attempts in milliseconds
    #[argh(option, long = "reconnect-delay-ms", default = "5000")]
    reconnect_delay_ms: u64,

    /// consecutive reconnect attempts before giving up (0 = unlimited)
    #[argh(option, long = "max-attempts")]
    max_attempts: Option<u32>,

    /// give up after this many milliseconds
    #[argh(option, long = "timeout-ms", default = "30000")]
    timeout_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "subscribe")]
/// open a subscription and print each push
struct SubscribeArgs {
    /// endpoint: tcp://host:port, ipc://path or a socket path
    #[argh(positional)]
    endpoint: String,

    /// subscribe method, e.g. eth_subscribe
    #[argh(positional)]
    method: String,

    /// params as JSON; an array is passed as is, anything else as one param
    #[argh(option, short = 'p', long = "params", default = "String::new()")]
    params: String,

    /// stop after this many pushes
    #[argh(option, short = 'n', long = "count")]
    count: Option<usize>,

    /// do not reconnect after the connection drops
    #[argh(switch, long = "no-reconnect")]
    no_reconnect: bool,

    /// delay between reconnect attempts in milliseconds
    #[argh(option, long = "reconnect-delay-ms", default = "5000")]
    reconnect_delay_ms: u64,

    /// consecutive reconnect attempts before giving up (0 = unlimited)
    #[argh(option, long = "max-attempts")]
    max_attempts: Option<u32>,

    /// connect timeout in milliseconds
    #[argh(option, long = "timeout-ms", default = "30000")]
    timeout_ms: u64,
}

fn session_options(
    no_reconnect: bool,
    delay_ms: u64,
    max_attempts: Option<u32>,
    timeout_ms: u64,
) -> SessionOptions {
    SessionOptions {
        reconnect: !no_reconnect,
        reconnect_delay: Duration::from_millis(delay_ms),
        max_attempts,
        timeout: Duration::from_millis(timeout_ms),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Logs go to stderr so stdout stays pipeable into jq. `call` is quiet
    // unless RUST_LOG asks otherwise.
    let default_level = match cli.command {
        Commands::Call(_) => "warn",
        Commands::Subscribe(_) => "info",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Call(args) => run_call(args).await,
        Commands::Subscribe(args) => run_subscribe(args).await,
    }
}

async fn run_call(args: CallArgs) -> Result<()> {
    let params = session::parse_params(&args.params)?;
    let options = session_options(
        args.no_reconnect,
        args.reconnect_delay_ms,
        args.max_attempts,
        args.timeout_ms,
    );

    let result = session::call(&args.endpoint, &args.method, params, &options).await?;

    // Output raw JSON to stdout
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

async fn run_subscribe(args: SubscribeArgs) -> Result<()> {
    let params = session::parse_params(&args.params)?;
    let options = session_options(
        args.no_reconnect,
        args.reconnect_delay_ms,
        args.max_attempts,
        args.timeout_ms,
    );

    let stdout = std::io::stdout();
    let delivered = session::subscribe(
        &args.endpoint,
        &args.method,
        params,
        args.count,
        &options,
        |payload| {
            let mut out = stdout.lock();
            writeln!(out, "{}", serde_json::to_string(payload)?)?;
            out.flush()?;
            Ok(())
        },
    )
    .await?;

    tracing::info!("Received {} notifications", delivered);
    Ok(())
}
