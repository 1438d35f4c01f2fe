//! Echo Bot Example
//!
//! Logs what it would answer to every message it receives. Replies are out of
//! scope for the framework, so the "echo" goes to the log.
//!
//! # Usage
//!
//! ```bash
//! FERROGRAM_BOT__TOKEN=123:abc cargo run --package echo-bot
//! FERROGRAM_BOT__TOKEN=123:abc cargo run --package echo-bot -- \
//!     --webhook-url https://bot.example.com/hook --port 8443 --secret s3cret
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ferrogram::prelude::*;
use ferrogram::runtime::ConfigLoader;

/// Command line options. Anything not given here comes from `ferrogram.toml`
/// and `FERROGRAM_*` variables.
#[derive(Debug, Parser)]
#[command(name = "echo-bot", about = "Ferrogram demo bot")]
struct Cli {
    /// Configuration file to load instead of searching.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve a webhook at this public URL instead of polling.
    #[arg(long)]
    webhook_url: Option<String>,

    /// Local port of the webhook listener.
    #[arg(long, default_value_t = 8443)]
    port: u16,

    /// Webhook secret token.
    #[arg(long)]
    secret: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn log_message(msg: Arc<Message>) {
    let sender = msg
        .from
        .as_ref()
        .and_then(|user| user.username.as_deref())
        .unwrap_or("unknown");
    info!(
        chat = msg.chat_id(),
        sender,
        text = msg.text_or_caption().unwrap_or_default(),
        "Message received"
    );
}

async fn echo(msg: Arc<Message>) -> Result<(), String> {
    let text = msg.text.as_deref().unwrap_or_default();
    let Some(content) = text.strip_prefix("/echo ") else {
        return Err("echo without content".to_string());
    };
    info!(chat = msg.chat_id(), reply = content, "Echo");
    Ok(())
}

async fn ping(msg: Arc<Message>) {
    info!(chat = msg.chat_id(), reply = "Pong!", "Ping");
}

async fn button(query: Arc<CallbackQuery>) {
    info!(
        query = %query.id,
        data = query.data.as_deref().unwrap_or_default(),
        "Button pressed"
    );
}

async fn approve_checkout(query: Arc<PreCheckoutQuery>) {
    info!(
        query = %query.id,
        amount = query.total_amount,
        currency = %query.currency,
        "Pre-checkout query"
    );
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new().with_current_dir().with_user_config_dir();
    if let Some(path) = &cli.config {
        loader = loader.file(path);
    }
    let mut config = loader.load()?;

    if let Some(url) = cli.webhook_url {
        config.mode = Mode::Webhook;
        config.webhook.url = url;
        config.webhook.port = cli.port;
        config.webhook.secret_token = cli.secret;
    }

    let runtime = BotRuntime::from_config(config)?;

    runtime.on_message(vec![], log_message);
    runtime.on_message(vec![filter::text_matches(r"^/echo\s")], echo);
    runtime.on_command("/ping", ping);
    runtime.on_callback_query(vec![filter::callback_data_prefix("btn:")], button);
    runtime.on_pre_checkout_query(approve_checkout);

    info!(
        handlers = runtime.registry().handler_count(),
        mode = %runtime.config().mode,
        "Echo bot ready"
    );
    runtime.run().await?;

    Ok(())
}
