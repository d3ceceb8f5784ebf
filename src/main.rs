use clap::Parser;
use tracing_subscriber::EnvFilter;

use nestegg::api::{ServeConfig, run_http_server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nestegg=info,tower_http=info")),
        )
        .init();

    let config = ServeConfig::parse();
    if let Err(e) = run_http_server(config).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
