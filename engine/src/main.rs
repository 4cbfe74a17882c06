use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pilot_core::{CancellationRegistry, PilotConfig};
use pilot_dispatch::{DispatchConfig, Dispatcher};
use pilot_learning::LearningLoop;
use pilot_metering::{Metering, Pricing, UsageThresholds};
use pilot_queue::{QueueConfig, QueueManager};
use pilot_store::Store;
use pilot_types::IncomingMessage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

mod adapters;

use adapters::{EchoRunner, StdioMessenger};

#[derive(Parser, Debug)]
#[command(name = "pilot-engine")]
#[command(about = "Multi-tenant coding-agent orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the queue worker loop and confirmation sweep in the foreground,
    /// reading messages from stdin one line at a time.
    Serve,
    /// Dispatch a single message and exit once its synchronous reply (or
    /// the confirmation prompt) has been printed.
    Run { prompt: String },
    /// Interactive loop: every line is handed to the dispatcher as a new
    /// message from a fixed "cli" context.
    Chat,
}

struct State {
    dispatcher: Arc<Dispatcher>,
    queue: Arc<QueueManager>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pilot_core::logging::init_tracing();

    let cli = Cli::parse();
    let state = build_state().await?;

    match cli.command {
        Command::Serve => {
            info!("starting pilot-engine queue workers");
            let recovered = state
                .queue
                .recover_orphans()
                .await
                .context("crash recovery failed")?;
            if recovered > 0 {
                info!(count = recovered, "recovered orphaned executions");
            }

            let queue = Arc::clone(&state.queue);
            tokio::spawn(async move { queue.run_forever().await });

            let dispatcher = Arc::clone(&state.dispatcher);
            tokio::spawn(async move { sweep_loop(dispatcher).await });

            read_lines("cli", state.dispatcher).await?;
        }
        Command::Run { prompt } => {
            dispatch_line(&state.dispatcher, "cli", &prompt).await?;
        }
        Command::Chat => {
            read_lines("cli", state.dispatcher).await?;
        }
    }

    Ok(())
}

async fn sweep_loop(dispatcher: Arc<Dispatcher>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
    loop {
        ticker.tick().await;
        if let Err(e) = dispatcher.sweep_expired_confirmations().await {
            tracing::warn!(error = %e, "confirmation sweep failed");
        }
    }
}

async fn read_lines(context_id: &str, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        dispatch_line(&dispatcher, context_id, &line).await?;
    }
    Ok(())
}

async fn dispatch_line(dispatcher: &Dispatcher, context_id: &str, text: &str) -> anyhow::Result<()> {
    let message = IncomingMessage {
        context_id: context_id.to_string(),
        sender_id: "cli-user".to_string(),
        sender_display_name: "cli-user".to_string(),
        thread_id: None,
        text: text.to_string(),
    };
    dispatcher
        .handle_message(message)
        .await
        .context("dispatcher failed to handle message")?;
    Ok(())
}

async fn build_state() -> anyhow::Result<State> {
    let pilot_config = PilotConfig::from_env().context("invalid pilot configuration")?;
    let store = Store::open(&PathBuf::from(&pilot_config.database_path))
        .await
        .context("failed to open store")?;

    let messenger = Arc::new(StdioMessenger::new());
    let runner = Arc::new(EchoRunner);
    let cancellations = CancellationRegistry::new();

    let metering = Arc::new(Metering::new(
        store.clone(),
        Pricing::from_env().context("invalid pricing configuration")?,
        UsageThresholds::from_env().context("invalid usage threshold configuration")?,
    ));
    let learning = Arc::new(LearningLoop::new(store.clone()));

    let dispatch_config = DispatchConfig::from_pilot_config(&pilot_config)?;
    let dispatcher = Arc::new(Dispatcher::new(
        messenger.clone(),
        runner.clone(),
        None,
        store.clone(),
        cancellations.clone(),
        dispatch_config,
    ));

    let queue = QueueManager::new(
        store,
        runner,
        messenger,
        cancellations,
        Some(metering),
        Some(learning),
        QueueConfig::from_env().context("invalid queue configuration")?,
    );

    Ok(State { dispatcher, queue })
}
