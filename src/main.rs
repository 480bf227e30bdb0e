use anyhow::Result;
use log::{error, info};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use pircbot::prelude::*;

/// Handlers shipped with the binary so a fresh bot answers something
fn demo_module() -> StaticModule {
    StaticModule::new(
        "demo",
        vec![
            Handler::command("hello", None, |ctx| async move {
                ctx.reply(&format!("Hello, {}!", ctx.message.sender_nick())).await
            }),
            Handler::command("say", Some(r"^say (?P<text>.+)$"), |ctx| async move {
                let text = ctx.args.named("text").unwrap_or_default().to_string();
                ctx.reply(&text).await
            }),
            Handler::command("version", None, |ctx| async move {
                ctx.reply(&format!("pircbot v{}", pircbot::VERSION)).await
            }),
            Handler::direct("mentioned", Some(r"(?i)\b:me:\b"), |ctx| async move {
                info!("{} mentioned us in {}", ctx.message.sender_nick(), ctx.target());
                Ok(())
            }),
            Handler::periodic("heartbeat", Duration::from_secs(3600), |ctx| async move {
                info!("Still connected as {} (heartbeat #{})", ctx.client.nick().await, ctx.run);
                Ok(())
            }),
        ],
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting pircbot v{}", pircbot::VERSION);

    let mut config = match env::args().nth(1) {
        Some(path) => BotConfig::load(&path).await?,
        None => BotConfig::from_env()?,
    };
    config
        .replace
        .entry("me".to_string())
        .or_insert_with(|| Replacement::template("{nick}"));

    let bot = Bot::new(config)?;
    bot.add_module(Arc::new(demo_module())).await;

    if let Err(e) = bot.connect().await {
        error!("Bot stopped: {:#}", e);
        return Err(e);
    }

    info!("Bot shutdown complete");
    Ok(())
}
