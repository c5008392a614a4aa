use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use breeze::agent::Agent;
use breeze::models::tool::Tool;
use breeze::providers::openai::OpenAiProvider;
use breeze::systems::{connect, StdioTransport, ToolSession};

mod configuration;
mod prompt;
mod session;

use configuration::Settings;
use prompt::rustyline::RustylinePrompt;
use prompt::Prompt;
use session::Session;

const USAGE: &str = "Usage: breeze <path_to_server_script>";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Tool server script to launch, for example weather.py
    server_script: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args_os().len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }
    let cli = Cli::parse();

    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::new().context("Failed to load configuration")?;
    let system_prompt = settings.system_prompt()?;
    let provider = OpenAiProvider::new(settings.provider_config())?;

    let transport = connect(
        &cli.server_script,
        &settings.launchers(),
        &settings.server_env(),
    )
    .with_context(|| format!("Failed to start {}", cli.server_script.display()))?;
    let tool_session = ToolSession::new(transport);

    let tools = match handshake(&tool_session).await {
        Ok(tools) => tools,
        Err(e) => {
            let _ = tool_session.close().await;
            return Err(e);
        }
    };
    let server = tool_session
        .server_info()
        .map(|info| info.name.clone())
        .unwrap_or_else(|| cli.server_script.display().to_string());

    let prompt = RustylinePrompt::new()?;
    prompt.breeze_ready(&server, &tools);

    let agent = Agent::new(Box::new(provider), Box::new(tool_session));
    let mut session = Session::new(agent, Box::new(prompt), &system_prompt);
    let result = session.start().await;
    session.shutdown().await;
    result
}

async fn handshake(tool_session: &ToolSession<StdioTransport>) -> Result<Vec<Tool>> {
    tool_session
        .initialize()
        .await
        .context("Failed to initialize the tool server")?;
    tool_session
        .list_tools()
        .await
        .context("Failed to list the tool server's tools")
}
