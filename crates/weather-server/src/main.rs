use anyhow::Result;
use tokio::io::{stdin, stdout, BufReader};
use tracing_subscriber::EnvFilter;

use weather_server::{WeatherClient, WeatherConfig, WeatherServer};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let server = WeatherServer::new(WeatherClient::new(WeatherConfig::from_env())?);
    server.serve(BufReader::new(stdin()), stdout()).await
}
