//! llmgate CLI
//!
//! Command-line interface for the llmgate gateway.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use llmgate::agents::{AgentRegistry, RateLimit};
use llmgate::analytics::{CostAnalytics, SnapshotTask};
use llmgate::api::{AppState, HttpServer};
use llmgate::providers::{CircuitBreaker, EchoProvider, Provider, ProviderRegistry};
use llmgate::router::{PricingTable, Router};
use llmgate::telemetry::{self, PrometheusSink};
use llmgate::Config;

/// llmgate - LLM gateway for AI agents
#[derive(Parser)]
#[command(name = "llmgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "LLMGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// HTTP API port, overriding the configured one
        #[arg(long, env = "LLMGATE_HTTP_PORT")]
        port: Option<u16>,
    },

    /// Show the effective pricing table
    Pricing,

    /// List configured agents
    Agents,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    if let Err(e) = telemetry::init_tracing(&config.logging) {
        eprintln!("Error initializing logging: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Serve { port } => run_serve(config, port).await,
        Commands::Pricing => run_pricing(&config, cli.format),
        Commands::Agents => run_agents(&config, cli.format),
        Commands::Config => run_config(&config, cli.format),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn build_agents(config: &Config) -> anyhow::Result<AgentRegistry> {
    let default_limit = RateLimit::new(
        config.agents.default_rate_limit_rps,
        config.agents.default_rate_limit_burst,
    );
    let agents = AgentRegistry::new().with_default_limit(default_limit);
    if config.agents.load_builtin {
        agents.load_builtin();
    }

    if let Some(dir) = &config.agents.config_dir {
        let loaded = agents
            .load_from_dir(dir)
            .with_context(|| format!("loading agents from {}", dir.display()))?;
        info!(count = loaded, dir = %dir.display(), "Loaded agent configurations");
    }

    Ok(agents)
}

fn build_providers(config: &Config) -> anyhow::Result<ProviderRegistry> {
    let breaker = config.providers.circuit_breaker;
    let mut providers = ProviderRegistry::new();
    for id in &config.providers.echo {
        let mut provider: Arc<dyn Provider> = Arc::new(EchoProvider::new(id.as_str()));
        if breaker.enabled {
            provider = Arc::new(CircuitBreaker::new(provider, breaker));
        }
        providers.register(provider)?;
    }
    if providers.is_empty() {
        warn!("No providers configured");
    }
    Ok(providers)
}

async fn run_serve(mut config: Config, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }

    let agents = Arc::new(build_agents(&config)?);
    let providers = build_providers(&config)?;
    let sink = Arc::new(PrometheusSink::new()?);

    let router = Arc::new(Router::from_config(
        &config,
        providers,
        agents.clone(),
        Some(sink.clone()),
    )?);
    let analytics = Arc::new(CostAnalytics::from_config(&config.analytics));

    info!(
        providers = ?router.providers().ids(),
        agents = agents.len(),
        "Starting llmgate on {}:{}",
        config.server.host,
        config.server.port
    );

    let shutdown = CancellationToken::new();
    let snapshots = SnapshotTask::spawn(
        router.clone(),
        analytics.clone(),
        config.analytics.snapshot_interval,
        shutdown.clone(),
    );

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutting down...");
        signal.cancel();
    });

    let state = AppState {
        router,
        analytics,
        agents,
        metrics: Some(sink),
    };
    let served = HttpServer::new(state, config.server.clone())
        .serve(shutdown.clone())
        .await;

    shutdown.cancel();
    snapshots.await.context("snapshot task panicked")?;
    served?;
    Ok(())
}

fn run_pricing(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let pricing = PricingTable::from_config(&config.pricing);

    match format {
        OutputFormat::Json => {
            let entries: serde_json::Map<String, serde_json::Value> = pricing
                .entries()
                .into_iter()
                .map(|(model, price)| Ok((model.to_string(), serde_json::to_value(price)?)))
                .collect::<serde_json::Result<_>>()?;
            let out = serde_json::json!({
                "default": pricing.default_pricing(),
                "models": entries,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!("{:<40} {:>12} {:>12}", "MODEL", "INPUT/M", "OUTPUT/M");
            for (model, price) in pricing.entries() {
                println!(
                    "{:<40} {:>12.4} {:>12.4}",
                    model, price.input_per_million, price.output_per_million
                );
            }
            let default = pricing.default_pricing();
            println!(
                "{:<40} {:>12.4} {:>12.4}",
                "(default)", default.input_per_million, default.output_per_million
            );
        }
    }
    Ok(())
}

fn run_agents(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let agents = build_agents(config)?.list();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&agents)?),
        OutputFormat::Text => {
            println!(
                "{:<20} {:<40} {:<10} {:>8} {}",
                "ID", "NAME", "TIER", "RPS", "DEFAULT MODEL"
            );
            for agent in agents {
                let tier = serde_json::to_value(agent.model_tier)?;
                let rps = agent
                    .rate_limit_rps
                    .map_or_else(|| "-".to_string(), |rps| format!("{rps}"));
                println!(
                    "{:<20} {:<40} {:<10} {:>8} {}",
                    agent.id,
                    agent.name,
                    tier.as_str().unwrap_or("-"),
                    rps,
                    agent.default_model().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

fn run_config(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => println!("{config:#?}"),
    }
    Ok(())
}
