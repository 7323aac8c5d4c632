use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use hookscope_stream::{
    AccountSelection, ArcLogRecord, BackfillClient, SessionCommand, StreamConfig, StreamDriver,
    WsConnector,
};

/// Hookscope - a terminal tail for XRPL Hooks builder debug streams
#[derive(Parser, Debug)]
#[command(name = "hookscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Account address whose stream is restored on startup (optional,
    /// addresses can also be selected by typing them on stdin)
    #[arg(value_name = "ACCOUNT")]
    account: Option<String>,

    /// Display label for the startup account
    #[arg(long, default_value = "account")]
    label: String,

    /// Stream host, overriding the configuration file
    #[arg(long)]
    host: Option<String>,

    /// History proxy endpoint, overriding the configuration file
    #[arg(long)]
    proxy: Option<String>,

    /// Path to the configuration file (defaults to ./hookscope.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing for debugging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    // Handle any errors
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let mut config = StreamConfig::load_or_default(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(proxy) = args.proxy {
        config.proxy = Some(proxy);
    }

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (selection_tx, selection_rx) = watch::channel(None);
    let (records_tx, mut records_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let (driver, mut state_rx) = StreamDriver::new(
        Arc::new(WsConnector::new(config.stream_endpoint())),
        BackfillClient::new(config.recent_endpoint(), config.proxy.clone()),
        commands_rx,
        selection_rx,
        records_tx,
        cancel.clone(),
    );
    let driver_task = tokio::spawn(driver.run());

    // A startup account is restored, pulling its recent history once the
    // stream opens
    if let Some(account) = &args.account {
        let _ = commands_tx.send(SessionCommand::Restore(AccountSelection::new(
            args.label.clone(),
            account.as_str(),
        )));
    }

    let mut selector = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                break;
            }

            line = selector.next_line() => match line {
                Ok(Some(line)) => apply_selector_line(line.trim(), &commands_tx, &selection_tx),
                // Selector input ended; wind the stream down
                Ok(None) | Err(_) => {
                    cancel.cancel();
                    break;
                }
            },

            Some(record) = records_rx.recv() => print_record(&record),

            changed = state_rx.changed() => match changed {
                Ok(()) => {
                    let state = *state_rx.borrow_and_update();
                    tracing::debug!(state = state.label(), "connection state changed");
                }
                // The driver exited; its result carries the reason
                Err(_) => break,
            },
        }
    }

    let result = driver_task.await?;

    // Print what was still in flight when the loop stopped
    while let Ok(record) = records_rx.try_recv() {
        print_record(&record);
    }

    result?;
    Ok(())
}

/// One stdin line drives the selector: `clear` drops the transcript, `stop`
/// goes idle, anything else is published as the newly selected account.
/// Send failures mean the driver exited; the state branch notices.
fn apply_selector_line(
    line: &str,
    commands_tx: &mpsc::UnboundedSender<SessionCommand>,
    selection_tx: &watch::Sender<Option<AccountSelection>>,
) {
    match line {
        "" => {}
        "clear" => {
            let _ = commands_tx.send(SessionCommand::ClearLog);
        }
        "stop" => {
            let _ = commands_tx.send(SessionCommand::Select(None));
        }
        address => {
            let _ = selection_tx.send(Some(AccountSelection::new(address, address)));
        }
    }
}

/// Render one record: kind tag, time label when present, message, and the
/// payload indented underneath
fn print_record(record: &ArcLogRecord) {
    match record.time_label.as_deref() {
        Some(label) if !label.is_empty() => {
            println!("[{}] {label} {}", record.kind.as_str(), record.message);
        }
        _ => println!("[{}] {}", record.kind.as_str(), record.message),
    }
    if let Some(payload) = record.payload.as_deref() {
        for line in payload.lines() {
            println!("    {line}");
        }
    }
}
