use axum::serve;
use remote_joiner::api::routes::create_router;
use remote_joiner::config::AppConfig;
use remote_joiner::RemoteJoiner;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("reqwest", LevelFilter::Warn)
        .filter_module("hyper", LevelFilter::Warn)
        .init();

    println!("Remote Joiner: cross-service query gateway");

    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{}, max_depth={}",
        config.server.host, config.server.port, config.joiner.max_depth
    );

    let registry = config.load_registry()?;
    match &config.topology {
        Some(path) => println!("Loaded {} service(s) from {}", registry.len(), path),
        None => println!("Using demo topology with {} service(s)", registry.len()),
    }

    if config.endpoints.is_empty() {
        println!("No endpoints configured, serving in-memory demo data");
    } else {
        println!("Fetching over HTTP from {} endpoint(s)", config.endpoints.len());
    }

    let joiner = RemoteJoiner::new(Arc::new(registry), config.build_fetcher())
        .with_options(config.joiner_options());

    run_server(create_router().with_state(Arc::new(joiner)), &config).await?;

    Ok(())
}

async fn run_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    println!("Remote Joiner running on http://{}", bind_address);
    println!("POST queries to http://{}/query", bind_address);

    serve(listener, app).await?;

    Ok(())
}
