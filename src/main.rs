use anyhow::Result;
use clap::{Parser, Subcommand};
use paxlog::{
    create_paxos_router, create_rendezvous_router, create_router, DiaryDaemon, NodeConfig,
    Registry, RendezvousConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "paxlog")]
#[command(about = "Paxos replicated diary node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        #[arg(short, long, default_value = "paxlog.toml")]
        config: PathBuf,
    },
    Init {
        #[arg(short, long, default_value = "paxlog.toml")]
        config: PathBuf,
    },
    Rendezvous {
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,

        #[arg(short, long, default_value = "12345")]
        port: u16,

        #[arg(long, default_value = "2000")]
        heartbeat_timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paxlog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config: config_path } => {
            run_node(config_path).await?;
        }
        Commands::Init { config: config_path } => {
            init_config(config_path)?;
        }
        Commands::Rendezvous {
            bind,
            port,
            heartbeat_timeout_ms,
        } => {
            let config = RendezvousConfig {
                bind_addr: bind,
                bind_port: port,
                heartbeat_timeout_ms,
            };
            run_rendezvous(config).await?;
        }
    }

    Ok(())
}

async fn run_node(config_path: PathBuf) -> Result<()> {
    let config = if config_path.exists() {
        info!("Loading config from {:?}", config_path);
        NodeConfig::load(&config_path)?
    } else {
        info!("Config file not found, using defaults");
        NodeConfig::default()
    };

    let daemon = Arc::new(DiaryDaemon::new(config.clone()).await?);

    let api_router = create_router(daemon.clone());
    let paxos_router = create_paxos_router(daemon.rpc());
    let router = api_router.merge(paxos_router);

    let listener = TcpListener::bind(&config.listen_addr()).await?;
    info!("Node listening on {}", config.listen_addr());

    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("API server error: {}", e);
        }
    });

    daemon.join().await?;

    let daemon_clone = daemon.clone();
    let daemon_handle = tokio::spawn(async move {
        if let Err(e) = daemon_clone.run().await {
            error!("Daemon error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    daemon.shutdown();

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = daemon_handle.await;
        api_handle.abort();
    })
    .await;

    Ok(())
}

async fn run_rendezvous(config: RendezvousConfig) -> Result<()> {
    let registry = Registry::new(config.heartbeat_timeout());
    let monitor = registry.spawn_monitor();
    let router = create_rendezvous_router(registry);

    let listener = TcpListener::bind(&config.listen_addr()).await?;
    info!("Rendezvous server listening on {}", config.listen_addr());

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("Rendezvous server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    monitor.abort();
    server_handle.abort();
    Ok(())
}

fn init_config(config_path: PathBuf) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!("Config file already exists: {:?}", config_path);
    }

    let config = NodeConfig::default();
    config.save(&config_path)?;
    println!("Created config file: {:?}", config_path);
    println!("\nEdit the config file to:");
    println!("  - Pick a bind port per node");
    println!("  - Point rendezvous_addr at the rendezvous server");
    println!("  - Give each node its own data_dir");

    Ok(())
}
