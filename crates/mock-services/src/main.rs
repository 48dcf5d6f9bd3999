//! Runs the mock payment, inventory and shipping services side by side.

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn port(var: &str, default: u16) -> u16 {
    std::env::var(var)
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(default)
}

async fn serve(name: &'static str, addr: String, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(service = name, %addr, "mock service listening");
    axum::serve(listener, app.layer(TraceLayer::new_for_http()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

    let result = tokio::try_join!(
        serve(
            "payment",
            format!("{host}:{}", port("PAYMENT_PORT", 8001)),
            mock_services::payment_router(),
        ),
        serve(
            "inventory",
            format!("{host}:{}", port("INVENTORY_PORT", 8002)),
            mock_services::inventory_router(),
        ),
        serve(
            "shipping",
            format!("{host}:{}", port("SHIPPING_PORT", 8003)),
            mock_services::shipping_router(),
        ),
    );

    if let Err(e) = result {
        tracing::error!(error = %e, "mock services stopped");
        std::process::exit(1);
    }
    tracing::info!("mock services shut down");
}
