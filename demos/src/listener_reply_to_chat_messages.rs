use std::sync::Arc;
use std::time::Duration;

use botsky::listeners;
use botsky::Client;
use dotenv::dotenv;
use log::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = Arc::new(Client::from_env()?);
    client.authenticate().await?;
    info!("Authentication successful");

    let listener = listeners::chat_listener(client);
    listener.register_handler("replyToChatMsgs", listeners::echo_chat_messages)?;
    listener.set_polling_interval(Duration::from_secs(3));
    listener.start();

    // Replies can take a few seconds to show up in the web app.
    info!("Echoing direct messages, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    listener.stop();
    tokio::time::sleep(Duration::from_secs(3)).await;
    info!("botsky is going to bed...");
    Ok(())
}
