use std::sync::Arc;
use std::time::Duration;

use botsky::listeners;
use botsky::Client;
use dotenv::dotenv;
use log::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // BOTSKY_HANDLE / BOTSKY_APPKEY may come from a .env file
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = Arc::new(Client::from_env()?);
    client.authenticate().await?;
    info!("Authentication successful");

    let listener = listeners::notification_listener(client);
    listener.register_handler("replyToMentions", listeners::reply_to_mentions)?;
    listener.start();

    info!("Listening for mentions, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    listener.stop();
    // let in-flight replies finish
    tokio::time::sleep(Duration::from_secs(3)).await;
    info!("botsky is going to bed...");
    Ok(())
}
