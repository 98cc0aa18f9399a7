//! `gatecheck`: ticket check-in from a terminal.
//!
//! A terminal has no camera, so detection reports unsupported and every
//! ticket is entered by hand or in bulk.

use anyhow::Context;
use clap::{Parser, Subcommand};
use gatecheck::capture::{CaptureSession, NoCamera};
use gatecheck::presenter::{self, NoticeLevel};
use gatecheck::{CheckInClient, Config, EventId, HttpCheckInService, ScannerView, Verdict};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Ticket check-in console
#[derive(Debug, Parser)]
#[command(author, version, about = "Verify event tickets against the check-in API")]
struct Cli {
    /// Base URL of the check-in API (overrides GATECHECK_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Event to check tickets in against (overrides GATECHECK_EVENT_ID)
    #[arg(long, global = true)]
    event: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Verify one ticket number
    Verify {
        /// Ticket number as printed on the ticket
        code: String,
    },
    /// Check in a batch, one ticket number per line
    Bulk {
        /// File to read, or `-` for stdin
        input: Option<PathBuf>,
    },
    /// Interactive console
    Console,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("invalid GATECHECK_* configuration")?;
    if let Some(url) = cli.api_url {
        config.api_url = url.trim_end_matches('/').to_string();
    }
    if let Some(event) = cli.event {
        config.event_id = Some(EventId(event));
    }
    tracing::debug!(api_url = %config.api_url, event = ?config.event_id, "Configuration loaded");

    let service = HttpCheckInService::from_config(&config).context("failed to build HTTP client")?;
    let view = ScannerView::builder(
        Arc::new(CaptureSession::new(Arc::new(NoCamera))),
        CheckInClient::new(Arc::new(service), &config),
    )
    .mode(config.scan_mode)
    .frame_interval(config.frame_interval)
    .event(config.event_id)
    .build();

    let exit = match cli.command {
        Command::Verify { code } => verify(&view, &code).await?,
        Command::Bulk { input } => bulk(&view, input).await?,
        Command::Console => console(&view).await?,
    };

    view.close(Duration::from_secs(5))
        .await
        .context("scanner did not shut down cleanly")?;
    Ok(exit)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatecheck=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn verify(view: &ScannerView, code: &str) -> anyhow::Result<ExitCode> {
    view.verify(code).await?;
    print_notices(view).await?;

    if let Some(card) = view.manual_card().await {
        println!("{card}");
    }
    let verdict = view
        .snapshot(|s| s.manual_result.as_ref().map(gatecheck::CheckInOutcome::verdict))
        .await;
    Ok(if verdict == Some(Verdict::Valid) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn bulk(view: &ScannerView, input: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let text = match input {
        Some(path) if path.as_os_str() != "-" => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        _ => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("failed to read stdin")?;
            text
        },
    };

    view.bulk(&text).await?;
    print_notices(view).await?;

    match view.bulk_summary().await {
        Some(summary) => {
            print!("{summary}");
            Ok(ExitCode::SUCCESS)
        },
        None => Ok(ExitCode::FAILURE),
    }
}

async fn console(view: &ScannerView) -> anyhow::Result<ExitCode> {
    // Surfaces the "no camera" reason the same way a device without one would.
    view.start_and_wait(Duration::from_secs(5)).await?;
    print_notices(view).await?;
    println!("{}", presenter::DETECTION_UNSUPPORTED);
    println!("Type a ticket number, `:event <id>`, `:bulk` (end with `.`), or `:quit`.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line.split_once(' ').unwrap_or((line, "")) {
            ("", _) => {},
            (":quit" | ":q", _) => break,
            (":event", id) => match id.trim().parse::<i64>() {
                Ok(id) => {
                    view.select_event(Some(EventId(id))).await?;
                    println!("Event {id} selected.");
                },
                Err(_) => println!("Usage: :event <id>"),
            },
            (":bulk", _) => {
                let mut batch = String::new();
                while let Some(item) = lines.next_line().await? {
                    if item.trim() == "." {
                        break;
                    }
                    batch.push_str(&item);
                    batch.push('\n');
                }
                view.bulk(&batch).await?;
                print_notices(view).await?;
                if let Some(summary) = view.bulk_summary().await {
                    print!("{summary}");
                }
            },
            _ => {
                view.verify(line).await?;
                print_notices(view).await?;
                if let Some(card) = view.manual_card().await {
                    println!("{card}");
                }
            },
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn print_notices(view: &ScannerView) -> anyhow::Result<()> {
    for notice in view.drain_notices().await? {
        let tag = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "ok",
            NoticeLevel::Warning => "warn",
            NoticeLevel::Error => "error",
        };
        println!("[{tag}] {}", notice.text);
    }
    Ok(())
}
