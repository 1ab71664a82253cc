//! `ouro` — the immortal supervisor (default) and the inner engine it
//! keeps alive.

mod supervisor;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ouro_config::AppConfig;

const CONFIG_FILE: &str = "ouro.toml";

#[derive(Parser)]
#[command(name = "ouro", about = "Autonomous self-evolving agent runtime")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Keep the engine alive: spawn, watch, recover, respawn (default).
    Supervise,
    /// Run the inner engine in this process.
    Engine,
    /// Print the resolved configuration and exit.
    Status,
}

fn init_tracing(log_file: &str) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(".", log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load_from(CONFIG_FILE)?;

    match cli.command.unwrap_or(Command::Supervise) {
        Command::Supervise => {
            let _guard = init_tracing("ouro-supervisor.log");
            supervisor::run(config).await
        }
        Command::Engine => {
            let _guard = init_tracing("ouro-engine.log");
            let mut engine = ouro_engine::Engine::bootstrap(config).await?;
            engine.run().await
        }
        Command::Status => {
            println!("workspace: {}", config.agent.workspace_path);
            println!("dreamer:   {}", config.llm.dreamer_model);
            println!("coder:     {}", config.llm.coder_model);
            println!("repo:      {} ({})", config.git.repo, config.git.branch);
            println!("vector:    {} (dim {})", config.memory.vector_path, config.memory.vector_dim);
            let degraded = config.degraded_subsystems();
            if degraded.is_empty() {
                println!("all subsystems configured");
            } else {
                println!("degraded:  {}", degraded.join(", "));
            }
            Ok(())
        }
    }
}
