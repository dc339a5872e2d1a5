use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{HttpRunApi, RunSession};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod prompt;

use config::load_settings;
use prompt::{choice_hint, interpret_line, Confirmation, LineAction};

/// Start a run on the run server and follow it in the terminal.
#[derive(Parser, Debug)]
struct Args {
    /// Run server base URL (overrides config and environment).
    #[arg(long)]
    server_url: Option<String>,
    /// Settings file; defaults to ./console.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Tracing filter directive, e.g. `debug` or `client_core=trace`.
    #[arg(long)]
    log_filter: Option<String>,
    /// Input for the run. Read from stdin when omitted.
    input: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(url) = args.server_url {
        settings.server_url = url;
    }
    if let Some(filter) = args.log_filter {
        settings.log_filter = filter;
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .init();

    let api = HttpRunApi::new(&settings.server_url)?;
    info!(server_url = %api.server_url(), "using run server");
    let mut session = RunSession::new(api);
    let mut lines = BufReader::new(io::stdin()).lines();

    let input = if args.input.is_empty() {
        println!("input:");
        lines
            .next_line()
            .await
            .context("failed to read run input")?
            .unwrap_or_default()
    } else {
        args.input.join(" ")
    };
    if input.trim().is_empty() {
        bail!("run input is empty");
    }

    let mut events = session
        .start(&input)
        .await
        .context("failed to start run")?;
    print!("{}", session.render());

    let mut stdin_open = true;
    let mut cancel_sent = false;
    let mut confirming: Option<Confirmation> = None;
    loop {
        tokio::select! {
            next = events.next() => match next {
                Some(Ok(event)) => {
                    session.ingest(event);
                    print!("{}", session.render());
                    if let Some(pending) = session.pending() {
                        println!("{}", choice_hint(pending));
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "run event stream failed");
                    print!("{}", session.render());
                    return Err(err.into());
                }
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => answer_from_line(&mut session, &mut confirming, &line).await,
                Ok(None) => stdin_open = false,
                Err(err) => {
                    warn!(error = %err, "stdin closed");
                    stdin_open = false;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                if cancel_sent {
                    break;
                }
                cancel_sent = true;
                match session.cancel().await {
                    Ok(true) => println!("cancel requested; press Ctrl-C again to quit"),
                    Ok(false) => break,
                    Err(err) => {
                        warn!(error = %err, "cancel request failed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

async fn answer_from_line(
    session: &mut RunSession<HttpRunApi>,
    confirming: &mut Option<Confirmation>,
    line: &str,
) {
    match interpret_line(session.pending(), confirming, line) {
        LineAction::Send(button_id) => {
            session.answer(button_id).await;
        }
        LineAction::Confirm(question) | LineAction::Reject(question) => println!("{question}"),
        LineAction::Ignore => {}
    }
}
