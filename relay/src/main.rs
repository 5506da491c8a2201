#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use args::{Args, Command};
use clap::Parser;
use relay_config::Config;
use relay_llm::{ImageInput, MessageRequest, ModelRouter, OtelMetrics, RouterError, ServiceTier, ToolDeclaration};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    let telemetry = relay_telemetry::init(config.telemetry.as_ref(), &args.log_filter)?;

    tracing::debug!(config_path = %args.config.display(), "configuration loaded");

    let router = ModelRouter::from_config(&config.llm, Arc::new(OtelMetrics::new()))?;

    let result = match args.command {
        Command::Send {
            tier,
            secondary,
            image,
            tools,
            message,
        } => send(&router, tier, secondary, image, tools.as_deref(), message).await,
        Command::Chat { tier, history } => chat(&router, tier, history.as_deref()).await,
        Command::Health => health(&router).await,
    };

    if let Err(e) = telemetry.force_flush() {
        tracing::warn!(error = %e, "metrics flush failed");
    }

    result
}

async fn send(
    router: &ModelRouter,
    tier: ServiceTier,
    secondary: bool,
    images: Vec<String>,
    tools: Option<&Path>,
    message: String,
) -> anyhow::Result<()> {
    if let Some(path) = tools {
        router.set_tools(read_tools(path)?);
    }

    let request = MessageRequest::new(message, tier)
        .with_images(images.into_iter().map(ImageInput::parse).collect())
        .with_tools(tools.is_some());

    let result = if secondary {
        router.send_message_with_secondary(request).await
    } else {
        router.send_message(request).await
    };

    match result {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            report(&e);
            Err(e.into())
        }
    }
}

async fn chat(router: &ModelRouter, tier: ServiceTier, history: Option<&Path>) -> anyhow::Result<()> {
    let history = match history {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("invalid history in {}", path.display()))?
        }
        None => serde_json::Value::Array(Vec::new()),
    };

    let mut session = router
        .create_chat_with_history(&history, tier)
        .ok_or_else(|| anyhow::anyhow!("no backend available for tier {tier}"))?;

    tracing::info!(%tier, backend = session.backend(), turns = session.history().len(), "chat started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        match router.continue_chat(&mut session, line).await {
            Ok(response) => println!("{}", response.text),
            Err(e) => report(&e),
        }
    }

    Ok(())
}

async fn health(router: &ModelRouter) -> anyhow::Result<()> {
    let results = router.health_check().await;
    println!("{}", serde_json::to_string_pretty(&results)?);

    if results.values().all(|healthy| *healthy) {
        Ok(())
    } else {
        anyhow::bail!("one or more backends are unhealthy")
    }
}

fn read_tools(path: &Path) -> anyhow::Result<Vec<ToolDeclaration>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid tool declarations in {}", path.display()))
}

/// Print the diagnostics attached to a routing failure
fn report(error: &RouterError) {
    if let RouterError::AllBackendsFailed { diagnostics, .. } = error
        && let Ok(json) = serde_json::to_string_pretty(diagnostics)
    {
        eprintln!("{json}");
    }
}
