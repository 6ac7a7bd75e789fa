//! Salamander bridge CLI.
//!
//! This is the main binary entry point. See the `salamander_bridge` library
//! for the core functionality.

use anyhow::{Context, Result};
use mimalloc::MiMalloc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::{Parser, Subcommand};
use salamander_bridge::{
    bootstrap, env::Environment, ports::stdio, ChannelPorts, Config, IdentityProvider, Operation,
    UnifiedClient, Variables, BINDINGS,
};
use salamander_bridge::storage::LocalStorage;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "salamander-bridge")]
#[command(version = VERSION)]
#[command(about = "Client bootstrap and subscription router for the Salamander game UI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bridge the UI host over stdin/stdout (JSON lines)
    Run,
    /// Print the persistent client identifier, creating it if needed
    ClientId,
    /// Run one GraphQL operation and print its data
    Query {
        /// GraphQL document
        document: String,
        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

fn init_logging() -> Result<()> {
    // stdout carries the port stream, so logs go to a file or stderr.
    let filter = Environment::current().default_log_filter();
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter));
    if let Ok(path) = std::env::var("SALAMANDER_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(env_logger::Target::Stderr);
    }
    builder.format_timestamp_secs().init();
    Ok(())
}

fn load_identity() -> Result<IdentityProvider> {
    let mut storage = LocalStorage::open_default()?;
    IdentityProvider::load_or_create(&mut storage)
}

async fn run_bridge() -> Result<()> {
    let config = Config::load()?;
    let identity = load_identity()?;
    if identity.was_created() {
        log::info!("Created client identifier {}", identity.client_id());
    }

    let (mut ports, endpoint) = ChannelPorts::for_bindings(&BINDINGS);
    let app = bootstrap::start(&config, identity.client_id(), &mut ports)?;
    log::info!("Salamander bridge v{} started", VERSION);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    let result = tokio::select! {
        result = stdio::serve(endpoint, stdin, stdout) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted");
            Ok(())
        }
    };

    app.shutdown();
    result
}

async fn run_query(document: &str, variables: Option<&str>) -> Result<()> {
    let config = Config::load()?;
    let endpoints = config.endpoints()?;
    let client = UnifiedClient::from_endpoints(&endpoints, &config)?;

    let operation = Operation::parse(document)?;
    let variables: Variables = match variables {
        Some(raw) => serde_json::from_str(raw).context("--variables must be a JSON object")?,
        None => Variables::new(),
    };

    let data = client.execute(&operation, variables).await?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run_bridge().await?,
        Commands::ClientId => {
            let identity = load_identity()?;
            println!("{}", identity.client_id());
        }
        Commands::Query {
            document,
            variables,
        } => run_query(&document, variables.as_deref()).await?,
        Commands::Config => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            match config.endpoints() {
                Ok(endpoints) => {
                    println!("query:   {}", endpoints.query);
                    println!("live:    {}", endpoints.live);
                    println!("command: {}", endpoints.command);
                }
                Err(e) => eprintln!("{e:#}"),
            }
        }
    }

    Ok(())
}
