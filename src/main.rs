//! voxloop — real-time voice conversation orchestration pipeline.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use voxloop::config::loader::{get_config_path, load_config};
use voxloop::config::schema::Config;
use voxloop::demo::{DemoSimulator, TEMPLATES};
use voxloop::gateway::HttpReasoningProvider;
use voxloop::pipeline::ConversationPipeline;
use voxloop::synthesis::HttpSynthesisProvider;
use voxloop::transport::{Connection, WsServer};

pub(crate) const VERSION: &str = "0.1.0";

#[derive(Parser)]
#[command(name = "voxloop", about = "voxloop - voice conversation pipeline", version = VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket gateway (transport + pipeline).
    Gateway {
        /// Gateway port (overrides config).
        #[arg(short, long)]
        port: Option<u16>,
        /// Verbose logging.
        #[arg(short, long)]
        verbose: bool,
    },
    /// Replay a scripted demo conversation through the pipeline.
    Demo {
        /// Template id (see --list).
        #[arg(short, long, default_value = "support")]
        template: String,
        /// Call id for the demo session.
        #[arg(short, long, default_value = "demo-call")]
        call: String,
        /// List available templates and exit.
        #[arg(long)]
        list: bool,
    },
    /// Show configuration summary.
    Status,
}

fn init_logging(verbose: bool) {
    // Always suppress noisy transitive crates regardless of RUST_LOG.
    let noisy_crate_filters = ",hyper=warn,reqwest=warn,tungstenite=warn";
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(_) => {
            let combined = format!(
                "{}{}",
                std::env::var("RUST_LOG").unwrap_or_default(),
                noisy_crate_filters
            );
            tracing_subscriber::EnvFilter::new(combined)
        }
        Err(_) => {
            let level = if verbose { "debug" } else { "info" };
            tracing_subscriber::EnvFilter::new(format!("{level}{noisy_crate_filters}"))
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();
}

fn build_pipeline(config: &Config) -> Arc<ConversationPipeline> {
    let reasoning = Arc::new(HttpReasoningProvider::new(
        &config.reasoning.api_key,
        &config.reasoning.api_base,
        &config.reasoning.model,
    ));
    let synthesis = Arc::new(HttpSynthesisProvider::new(
        &config.synthesis.api_key,
        &config.synthesis.api_base,
    ));
    ConversationPipeline::new(config, reasoning, synthesis)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Gateway { port, verbose } => {
            init_logging(verbose);

            let mut config = load_config(None);
            if let Some(port) = port {
                config.gateway.port = port;
            }

            let pipeline = build_pipeline(&config);
            let server = WsServer::new(config.gateway.clone(), pipeline.clone());
            let addr = server.start().await?;
            println!("voxloop gateway listening on ws://{addr}");

            tokio::signal::ctrl_c().await?;
            println!("shutting down");
            server.stop();
            for call_id in pipeline.registry().active_calls().await {
                pipeline.end_call(&call_id).await;
            }
        }

        Commands::Demo { template, call, list } => {
            init_logging(false);

            if list {
                for t in TEMPLATES {
                    println!("{:<12} {}", t.id, t.title);
                }
                return Ok(());
            }

            let mut config = load_config(None);
            config.store.enabled = false;
            let pipeline = build_pipeline(&config);

            // Print every broadcast event as it happens.
            let observer: Arc<dyn Connection> = Arc::new(StdoutConnection);
            pipeline.observer_join(&call, None, observer).await;

            let template_turns = voxloop::demo::template(&template)
                .map(|t| t.lines.len())
                .unwrap_or(0);
            let simulator = DemoSimulator::new(pipeline.clone());
            let handle = simulator.start_scripted_session(&call, &template)?;

            // Wait for the script to finish (bounded by worst-case delays).
            let deadline = tokio::time::Instant::now()
                + Duration::from_millis(2_000 * template_turns as u64 + 3_000);
            loop {
                tokio::time::sleep(Duration::from_millis(200)).await;
                let done = pipeline
                    .registry()
                    .snapshot(&call)
                    .await
                    .map(|s| s.turns.len() >= template_turns)
                    .unwrap_or(true);
                if done || tokio::time::Instant::now() > deadline {
                    break;
                }
            }
            handle.cancel();
            pipeline.end_call(&call).await;
        }

        Commands::Status => {
            init_logging(false);
            let config = load_config(None);
            println!("config file: {}", get_config_path().display());
            println!("gateway:     ws://{}:{}", config.gateway.host, config.gateway.port);
            println!("reasoning:   {} ({})", config.reasoning.api_base, config.reasoning.model);
            println!("synthesis:   {}", config.synthesis.api_base);
            println!("latency:     {}ms budget, window {}", config.latency.budget_ms, config.latency.window);
            println!(
                "session:     {}min inactivity timeout, {} turn context",
                config.session.inactivity_timeout_ms / 60_000,
                config.session.context_window
            );
        }
    }

    Ok(())
}

/// Demo observer that prints every delivered event to stdout.
struct StdoutConnection;

#[async_trait::async_trait]
impl Connection for StdoutConnection {
    fn id(&self) -> &str {
        "stdout"
    }

    async fn send(&self, payload: &str) -> Result<()> {
        println!("{payload}");
        Ok(())
    }
}
