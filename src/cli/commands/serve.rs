use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::{get_bind_address, initialize_app_state};
use crate::router::create_router;

pub async fn serve() -> Result<()> {
    info!("Fintrack application starting up");

    let state = match initialize_app_state().await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            return Err(e);
        }
    };

    // Idempotent schema bootstrap on every start.
    info!("Running database migrations");
    Migrator::up(&state.db, None).await?;
    debug!("Schema is up to date");

    let app = create_router(state);

    let bind_address = get_bind_address();
    let listener = match TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", bind_address, e);
            return Err(e.into());
        }
    };

    info!("Fintrack API server running on http://{}", bind_address);
    info!("Swagger UI available at http://{}/swagger-ui", bind_address);

    // ConnectInfo feeds the rate limiter's per-client keys.
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server shutdown gracefully");
    Ok(())
}
