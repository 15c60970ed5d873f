use datadeck_core::config::AppConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,datadeck_core=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()?;
    datadeck_server::serve(config).await
}
