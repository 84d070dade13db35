mod config;
mod handlers;
mod platform;
mod router;
mod translator;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Transport};
use crate::router::Router;
use crate::translator::AzureTranslator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,emitrbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A missing .env is fine, the variables may come from the environment
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from: {}", path.display());
    }

    let config = Config::from_env().context("Invalid configuration")?;

    info!("Configuration loaded successfully");
    info!("  Translator endpoint: {}", config.translator.endpoint);
    info!("  Translator region: {}", config.translator.region);
    match &config.transport {
        Transport::Webhook { port, .. } => info!("  Transport: webhook on port {}", port),
        Transport::Polling => info!("  Transport: polling"),
    }

    let translator = AzureTranslator::new(config.translator.clone())
        .context("Failed to create translator client")?;
    let router = Arc::new(Router::with_default_commands(Arc::new(translator)));

    info!("Bot is starting...");
    platform::telegram::run(&config.bot_token, &config.transport, router).await?;

    Ok(())
}
