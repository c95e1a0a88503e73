use clap::Parser; // for cli
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use clinic_gateway::app;
use clinic_gateway::config::Args;
use clinic_gateway::state::AppState;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // parse cli arguments
    let args = Args::parse();
    init_tracing(args.log_json);

    // creating shared state
    let state = Arc::new(AppState::from_args(&args));

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "gateway listening");
    info!(
        limit = args.rate_limit,
        window_secs = args.rate_window,
        max_entries = args.rate_limit_max_entries,
        "public rate limit"
    );
    info!(
        admin = args.admin_key().is_some(),
        webhook = args.webhook_secret().is_some(),
        ai = args.llm_api_key().is_some(),
        model = %args.llm_model,
        "secrets configured"
    );

    axum::serve(listener, app(state)).await?;
    Ok(())
}
