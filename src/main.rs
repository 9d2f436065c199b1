// ABOUTME: Main entry point for the chat-platform to agent-server bridge
// ABOUTME: Initializes logging, config, shared context, observer, and the event pump

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parley::agent_api::{run_event_pump, HttpAgentClient, HttpCardRenderer, HttpChatSink};
use parley::config::Config;
use parley::context::BridgeContext;
use parley::observer::CrossTurnObserver;
use parley::registry::ListenerRegistry;
use parley::subagent::{DiscoveryConfig, SubagentTracker};
use parley::traits::{ChatSink, TokioSleeper};
use parley::turn::{TurnConfig, TurnCoordinator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "parley", about = "Bridge a chat platform to an agent server")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Agent session ids to own and observe from startup
    #[arg(long = "session")]
    sessions: Vec<String>,

    /// Run one turn against the first owned session, then keep observing
    #[arg(long)]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\nPANIC! Bridge crashed with the following error:\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting parley bridge");

    // Load configuration
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load_from(&cli.config)?;

    tracing::info!(
        agent = %config.agent.base_url,
        webhook = %config.chat.webhook_url,
        first_event_timeout_secs = config.turn.first_event_timeout_secs,
        sessions = cli.sessions.len(),
        "Configuration loaded"
    );

    // Shared ownership and dedup sets
    let context = BridgeContext::new();
    for session in &cli.sessions {
        context.owned_sessions.insert(session).await;
    }

    let registry = ListenerRegistry::new();
    let api = Arc::new(
        HttpAgentClient::new(&config.agent.base_url).context("agent client init failed")?,
    );
    let chat = Arc::new(
        HttpChatSink::new(&config.chat.webhook_url).context("chat sink init failed")?,
    );
    let renderer = Arc::new(
        HttpCardRenderer::new(&config.chat.card_url).context("card renderer init failed")?,
    );
    let sleeper = Arc::new(TokioSleeper);

    let tracker = SubagentTracker::new(
        api.clone(),
        sleeper.clone(),
        DiscoveryConfig {
            attempts: config.subagent.poll_attempts,
            base_delay: config.poll_base_delay(),
        },
    );

    let coordinator = TurnCoordinator::new(
        registry.clone(),
        api.clone(),
        chat.clone(),
        renderer,
        tracker,
        context.owned_sessions.clone(),
        context.owned_messages.clone(),
        context.seen_requests.clone(),
        sleeper,
        TurnConfig {
            first_event_timeout: config.first_event_timeout(),
        },
    );

    // Watch every owned session for activity no local turn caused
    let observer = CrossTurnObserver::new(
        registry.clone(),
        chat.clone(),
        context.owned_sessions.clone(),
        context.owned_messages.clone(),
        context.busy_sessions.clone(),
        context.seen_requests.clone(),
    );
    for session in &cli.sessions {
        observer.observe(session).await;
    }

    // One long-lived SSE subscription drives every listener
    let pump_registry = registry.clone();
    let pump_url = config.agent.base_url.clone();
    let pump = tokio::spawn(async move {
        run_event_pump(&pump_url, pump_registry).await;
    });

    tracing::info!("Bridge ready - event pump running");

    if let Some(prompt) = &cli.prompt {
        let session = cli
            .sessions
            .first()
            .context("--prompt requires at least one --session")?;
        // One active turn per session; the busy mark keeps the observer
        // from double-delivering the turn's own output.
        observer.mark_session_busy(session).await;
        let result = coordinator.run_turn(session, prompt).await;
        observer.mark_session_free(session).await;
        match result {
            Ok(reply) => {
                tracing::info!(session = %session, chars = reply.len(), "turn reply received");
                if let Err(e) = chat.send_text(&reply).await {
                    tracing::warn!(error = %e, "reply delivery failed");
                }
            }
            Err(e) => tracing::error!(session = %session, error = %e, "turn failed"),
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received, stopping");

    pump.abort();
    observer.stop().await;
    // Give in-flight downstream calls a moment to drain
    tokio::time::sleep(Duration::from_millis(100)).await;

    Ok(())
}
