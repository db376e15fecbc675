use axum::serve;
use tokio::net::TcpListener;
use workshop_services::config::AppConfig;
use workshop_services::{broker_app, init_logging, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();
    init_logging();

    println!("PostgreSQL service broker");

    let config = AppConfig::load()?;
    let target = &config.broker.postgres;
    println!(
        "Provisioning on {}:{} as {}",
        target.host, target.port, target.user
    );
    if config.broker.basic_auth().is_none() {
        println!("WARNING: broker API is not protected by basic auth");
    }

    let app = broker_app(&config).await?;

    let bind_address = config.broker.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    println!("Service broker running on http://{}", bind_address);

    serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
