mod api_quota;
mod auth;
mod email;
mod error;
mod pacing;
mod request_tracing;
mod selection;
mod server_config;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use anyhow::Context;
use mimalloc::MiMalloc;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    email::BatchDeleter,
    server_config::{cfg, GmailConfig},
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    tracing::info!("Starting with config: {}", *cfg);

    let gmail = GmailConfig::from_file(&cfg.credentials_path).with_context(|| {
        format!(
            "Cannot read client credentials from {}",
            cfg.credentials_path
        )
    })?;

    let http_client = reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .build()
        .context("Cannot build HTTP client")?;

    let mailbox = auth::obtain_transport(&cfg, gmail, http_client)
        .await
        .context("Authorization failed")?;

    println!("Scanning mailbox, this can take a while...");
    let aggregate = email::aggregate(&mailbox)
        .await
        .context("Cannot list messages")?;

    println!(
        "Found {} emails from {} senders.",
        aggregate.total_messages(),
        aggregate.records.len()
    );
    if !aggregate.dropped.is_empty() {
        println!(
            "{} emails were skipped because their sender could not be read.",
            aggregate.dropped.len()
        );
    }

    let senders = aggregate.into_ranked();
    let deleter = BatchDeleter::from_config(&cfg)
        .on_progress(Arc::new(|n| println!("Successfully deleted {n} emails...")));
    let summary = selection::run(
        &mailbox,
        &deleter,
        &senders,
        BufReader::new(tokio::io::stdin()),
        &mut std::io::stdout(),
    )
    .await?;

    println!(
        "Done. Deleted {} emails from {} senders ({} failed).",
        summary.messages_deleted,
        summary.senders_cleared,
        summary.failed_ids.len()
    );
    if !summary.failed_ids.is_empty() {
        println!("Emails left in place: {}", summary.failed_ids.join(", "));
    }
    tracing::info!("Finished: {:?}", summary);

    Ok(())
}
