// src/main.rs - bridge server entry point

use std::env;
use std::sync::Arc;

use roverduino::broker::Broker;
use roverduino::config;
use roverduino::web;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Starting Roverduino bridge server");

    let mut config = config::load_config("rover.toml").map_err(|e| {
        tracing::error!("Failed to load rover.toml: {}", e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    // The COM port on the command line wins over the config file.
    if let Some(port) = env::args().nth(1) {
        config.com_port = port;
    }
    if config.com_port.is_empty() {
        tracing::error!("No COM port given. Usage: server <COM_PORT>");
        std::process::exit(2);
    }

    tracing::info!("Expecting to find board on {}", config.com_port);

    let listen_addr = config.listen_addr.clone();
    let broker = Arc::new(Broker::new(config));
    let app = web::api::create_router(broker);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
