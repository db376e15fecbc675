use axum::serve;
use std::sync::Arc;
use tokio::net::TcpListener;
use workshop_services::config::AppConfig;
use workshop_services::store::{MemoryStore, PostgresStore};
use workshop_services::{init_logging, shutdown_signal, stock_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();
    init_logging();

    println!("Stock API");

    // Load configuration
    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{}, {} configured user(s)",
        config.server.host,
        config.server.port,
        config.security.users.len()
    );
    if config.stock.expose_env {
        println!("WARNING: /stock/get-env is enabled and echoes process environment values");
    }

    let app = if config.database.in_memory {
        println!("Keeping stock items in memory");
        stock_app(Arc::new(MemoryStore::new()), &config)
    } else {
        println!("Connecting to PostgreSQL...");
        let database_url = config.database_url()?;
        let postgres_store =
            PostgresStore::new(&database_url, config.database.max_connections.unwrap_or(20))
                .await?;

        println!("Running database migrations...");
        postgres_store.migrate().await?;
        println!("Database ready");

        stock_app(Arc::new(postgres_store), &config)
    };

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    println!("Stock API running on http://{}", bind_address);

    serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
