//! `tender run` — live waterfall driven by the wall clock and stdin.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::info;

use tender_core::{Clock, LaneConfig, SystemClock};
use tender_registry::{Dispatcher, RunHandle, RunRegistry};
use tender_waterfall::{LogEntry, LogKind, Response};

use super::report;

/// An operator command read from stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Accept(String),
    Decline(String),
    Pause,
    Resume,
    Cancel,
    Status,
}

pub fn parse_command(line: &str) -> Result<OperatorCommand, String> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or_default().to_ascii_lowercase();
    let arg = parts.next().map(str::to_string);
    match (verb.as_str(), arg) {
        ("accept", Some(carrier)) => Ok(OperatorCommand::Accept(carrier)),
        ("decline", Some(carrier)) => Ok(OperatorCommand::Decline(carrier)),
        ("accept" | "decline", None) => Err(format!("usage: {verb} <carrier-id>")),
        ("pause", _) => Ok(OperatorCommand::Pause),
        ("resume", _) => Ok(OperatorCommand::Resume),
        ("cancel", _) => Ok(OperatorCommand::Cancel),
        ("status", _) => Ok(OperatorCommand::Status),
        ("", _) => Err("empty command".to_string()),
        (other, _) => Err(format!("unknown command: {other}")),
    }
}

pub async fn run(lane_path: &Path, load_id: &str, tick_secs: u64) -> anyhow::Result<()> {
    let lane = LaneConfig::from_file(lane_path)?.into_lane()?;

    // Offer delivery is out of process; print what would be sent.
    let registry = RunRegistry::new().with_listener(Arc::new(|e: &LogEntry| {
        if e.kind == LogKind::OfferSent {
            println!(
                "→ offer to {}: {}",
                e.carrier_id.as_deref().unwrap_or("-"),
                e.detail
            );
        }
    }));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dispatcher = Dispatcher::new(registry, Arc::clone(&clock));

    let started = clock.now();
    let handle = dispatcher.begin(&lane, load_id).await?;
    info!(lane = %lane.id, load = %load_id, "live run started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = dispatcher.spawn_ticker(Duration::from_secs(tick_secs.max(1)), shutdown_rx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => handle_line(&dispatcher, &handle, &line, &*clock).await,
                    None => break,
                }
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }

        let finished = dispatcher
            .state(&lane.id, load_id)
            .await
            .is_none_or(|s| s.status.is_terminal());
        if finished {
            break;
        }
    }

    let _ = shutdown_tx.send(true);
    ticker.await?;

    if let Some(log) = dispatcher.log(&lane.id, load_id).await {
        println!("Execution log:");
        print!("{}", report::format_log(started, log.all()));
    }
    if let Some(state) = dispatcher.state(&lane.id, load_id).await {
        print!("{}", report::format_summary(&state, clock.now()));
    }
    Ok(())
}

async fn handle_line(dispatcher: &Dispatcher, handle: &RunHandle, line: &str, clock: &dyn Clock) {
    let command = match parse_command(line) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return;
        }
    };

    let result = match command {
        OperatorCommand::Accept(carrier) => dispatcher
            .record_response(handle, &carrier, Response::Accepted)
            .await
            .map(|_| ()),
        OperatorCommand::Decline(carrier) => dispatcher
            .record_response(handle, &carrier, Response::Declined)
            .await
            .map(|_| ()),
        OperatorCommand::Pause => dispatcher.pause(handle).await,
        OperatorCommand::Resume => dispatcher.resume(handle).await,
        OperatorCommand::Cancel => dispatcher.cancel(handle).await,
        OperatorCommand::Status => {
            if let Some(state) = dispatcher
                .state(&handle.key.lane_id, &handle.key.load_id)
                .await
            {
                print!("{}", report::format_summary(&state, clock.now()));
            }
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
    }
}
