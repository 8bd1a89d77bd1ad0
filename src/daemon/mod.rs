//! Long-running daemon: channel listener, message handlers and the
//! maintenance workers, each under a supervisor that restarts it with
//! exponential backoff. Ctrl-C cancels everything via one token.

use crate::cache::ResponseCache;
use crate::channels::{Channel, CliChannel, MessageEvent};
use crate::config::Config;
use crate::decision::ThreadRandom;
use crate::pipeline::{Engine, Outcome};
use crate::providers;
use anyhow::Result;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub async fn run(config: Config) -> Result<()> {
    let cache = if config.cache.enabled {
        Some(Arc::new(ResponseCache::open(
            &config.workspace_dir,
            &config.cache,
        )?))
    } else {
        None
    };

    let generator = providers::create_generator(&config)?;
    let engine = Arc::new(Engine::new(
        &config,
        generator,
        cache.clone(),
        Arc::new(ThreadRandom),
    ));
    let channel: Arc<dyn Channel> = Arc::new(CliChannel::new());

    let shutdown = CancellationToken::new();
    let initial_backoff = config.reliability.channel_initial_backoff_secs;
    let max_backoff = config.reliability.channel_max_backoff_secs;
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    tracing::info!(
        persona = %config.persona.name,
        channel = channel.name(),
        cache = cache.is_some(),
        autonomous = config.gating.autonomous_enabled,
        "daemon starting"
    );

    // Inbound messages fan out to per-message handler tasks so a slow
    // generation never blocks the listener.
    let (tx, mut rx) = mpsc::channel::<MessageEvent>(256);
    {
        let engine = engine.clone();
        let channel = channel.clone();
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                    () = shutdown.cancelled() => break,
                };
                let engine = engine.clone();
                let channel = channel.clone();
                tokio::spawn(async move {
                    handle_event(&engine, channel.as_ref(), event).await;
                });
            }
        }));
    }

    {
        let channel = channel.clone();
        handles.push(spawn_component_supervisor(
            "listener",
            initial_backoff,
            max_backoff,
            shutdown.clone(),
            move || {
                let channel = channel.clone();
                let tx = tx.clone();
                async move { channel.listen(tx).await }
            },
        ));
    }

    if let Some(cache) = cache {
        let interval_secs = config.cache.sweep_interval_secs.max(1);
        handles.push(spawn_component_supervisor(
            "cache-sweeper",
            initial_backoff,
            max_backoff,
            shutdown.clone(),
            move || {
                let cache = cache.clone();
                async move { run_cache_sweeper(cache, interval_secs).await }
            },
        ));
    }

    {
        let engine = engine.clone();
        let interval_secs = config.reliability.state_sweep_interval_secs.max(1);
        handles.push(spawn_component_supervisor(
            "state-sweeper",
            initial_backoff,
            max_backoff,
            shutdown.clone(),
            move || {
                let engine = engine.clone();
                async move { run_state_sweeper(engine, interval_secs).await }
            },
        ));
    }

    if config.gating.autonomous_enabled {
        let engine = engine.clone();
        let channel = channel.clone();
        let interval_secs = config.gating.spontaneous_tick_secs.max(1);
        handles.push(spawn_component_supervisor(
            "spontaneous-ticker",
            initial_backoff,
            max_backoff,
            shutdown.clone(),
            move || {
                let engine = engine.clone();
                let channel = channel.clone();
                async move { run_spontaneous_ticker(engine, channel, interval_secs).await }
            },
        ));
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    shutdown.cancel();
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

async fn handle_event(engine: &Engine, channel: &dyn Channel, event: MessageEvent) {
    let conversation_id = event.conversation_id.clone();
    let outcome = engine.handle_message(&event).await;
    deliver(channel, &conversation_id, &outcome).await;
}

async fn deliver(channel: &dyn Channel, conversation_id: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Reply { cached, .. } => {
            tracing::info!(conversation_id, cached, "sending reply");
        }
        Outcome::Deescalate { .. } => {
            tracing::info!(conversation_id, "sending de-escalation line");
        }
        Outcome::Apology { .. } => {
            tracing::info!(conversation_id, "sending apology line");
        }
        Outcome::Silent { verdict } => {
            tracing::debug!(conversation_id, ?verdict, "staying silent");
            return;
        }
    }
    if let Some(text) = outcome.text() {
        if let Err(err) = channel.send(conversation_id, text).await {
            tracing::error!(conversation_id, error = %err, "channel send failed");
        }
    }
}

async fn run_cache_sweeper(cache: Arc<ResponseCache>, interval_secs: u64) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await; // first tick fires immediately
    loop {
        interval.tick().await;
        let (exact, semantic) = cache.sweep(now_ms())?;
        if exact + semantic > 0 {
            tracing::debug!(exact, semantic, "swept expired cache entries");
        }
    }
}

async fn run_state_sweeper(engine: Arc<Engine>, interval_secs: u64) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await;
    loop {
        interval.tick().await;
        let dropped = engine.sweep_state(now_ms());
        if dropped > 0 {
            tracing::debug!(dropped, "swept idle conversation state");
        }
    }
}

/// Periodically offers every known conversation the chance to hear from the
/// bot unprompted. The probability and silence gates live in the pipeline.
async fn run_spontaneous_ticker(
    engine: Arc<Engine>,
    channel: Arc<dyn Channel>,
    interval_secs: u64,
) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await;
    loop {
        interval.tick().await;
        for conversation_id in engine.active_conversations() {
            let outcome = engine.handle_tick(&conversation_id, now_ms()).await;
            deliver(channel.as_ref(), &conversation_id, &outcome).await;
        }
    }
}

fn spawn_component_supervisor<F, Fut>(
    name: &'static str,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
    shutdown: CancellationToken,
    mut run_component: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut backoff = initial_backoff_secs.max(1);
        let max_backoff = max_backoff_secs.max(backoff);

        loop {
            tokio::select! {
                result = run_component() => match result {
                    Ok(()) => tracing::warn!("daemon component '{name}' exited unexpectedly"),
                    Err(e) => tracing::error!("daemon component '{name}' failed: {e}"),
                },
                () = shutdown.cancelled() => return,
            }

            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}
