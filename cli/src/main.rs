mod keygen;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use tessera_config::TesseraConfig;
use tessera_core::{
    FilePodDirectory, IngressClient, MapperOptions, OrderLedger, PodDirectory, PodMapper,
    RocksDbStore, Trader,
};
use tessera_order::{Order, OrderId, OrderRequest, Token};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type CliTrader = Trader<RocksDbStore, FilePodDirectory, IngressClient>;

#[derive(Parser)]
#[command(name = "tessera", version, about = "Threshold order distribution for traders")]
struct Cli {
    /// Config file (defaults to ./tessera.toml, then ~/.tessera/tessera.toml)
    #[arg(long, global = true, env = "TS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a pod member key file
    Keygen {
        /// Key file path (default: ~/.tessera/member.json)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Network address to publish with the member entry
        #[arg(long)]
        address: Option<String>,
    },
    /// Print the directory entry for an existing key file
    Member {
        #[arg(long)]
        key: Option<PathBuf>,
    },
    /// List pods in the directory
    Pods,
    /// Build the submission payload without sending it
    Fragment {
        /// Order request JSON file
        #[arg(long)]
        order: PathBuf,
        #[arg(long)]
        signature: String,
    },
    /// Fragment, submit and record an order
    Submit {
        #[arg(long)]
        order: PathBuf,
        #[arg(long)]
        signature: String,
        /// Available balance of the order's locked token
        #[arg(long)]
        available: u128,
    },
    /// Cancel an open order
    Cancel {
        /// Order id (base64)
        #[arg(long)]
        id: OrderId,
        #[arg(long)]
        signature: String,
    },
    /// Locked balance of a token
    Balance {
        #[arg(long)]
        token: Token,
    },
    /// List open orders
    Orders {
        #[arg(long)]
        token: Option<Token>,
    },
    /// Print the effective config, or a sample one
    Config {
        #[arg(long)]
        sample: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tessera=info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Keygen { out, address } => {
            let path = match out {
                Some(path) => path,
                None => keygen::default_key_path()?,
            };
            let entry = keygen::generate(&path, address)?;
            info!(path = %path.display(), "wrote member key");
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Command::Member { key } => {
            let path = match key {
                Some(path) => path,
                None => keygen::default_key_path()?,
            };
            let key = keygen::load(&path)?;
            println!("{}", serde_json::to_string_pretty(&key.member().to_member())?);
        }
        Command::Config { sample: true } => {
            print!("{}", TesseraConfig::generate_sample());
        }
        Command::Config { sample: false } => {
            let config = load_config(cli.config.as_deref())?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Command::Pods => {
            let config = load_config(cli.config.as_deref())?;
            let directory = FilePodDirectory::new(&config.directory.pods_path);
            for pod in directory.pods()? {
                println!(
                    "{}  size={}  threshold={}",
                    pod.id,
                    pod.size(),
                    pod.threshold()
                );
            }
        }
        Command::Fragment { order, signature } => {
            let config = load_config(cli.config.as_deref())?;
            let trader = open_trader(&config)?;
            let order = read_order(&order)?;
            let cancel = cancel_on_ctrl_c();

            let prepared = trader
                .prepare(&order, &signature, &mut OsRng, &cancel)
                .await?;
            println!("{}", prepared.payload.to_json_pretty()?);
        }
        Command::Submit {
            order,
            signature,
            available,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let trader = open_trader(&config)?;
            let order = read_order(&order)?;
            let cancel = cancel_on_ctrl_c();

            let opened = trader
                .open_order(&order, &signature, available, &mut OsRng, &cancel)
                .await?;
            for failure in &opened.failed_pods {
                warn!(error = %failure, "pod not included");
            }
            if !opened.cancelled_pods.is_empty() {
                warn!(count = opened.cancelled_pods.len(), "pods skipped by cancellation");
            }
            println!("{}", opened.order_id);
        }
        Command::Cancel { id, signature } => {
            let config = load_config(cli.config.as_deref())?;
            let trader = open_trader(&config)?;
            trader.cancel_order(&id, &signature).await?;
            println!("cancelled {id}");
        }
        Command::Balance { token } => {
            let config = load_config(cli.config.as_deref())?;
            let trader = open_trader(&config)?;
            let locked = trader.ledger().locked_balance(token)?;
            let withdrawable = trader.can_withdraw(token)?;
            println!("token={token}  locked={locked}  withdrawable={withdrawable}");
        }
        Command::Orders { token } => {
            let config = load_config(cli.config.as_deref())?;
            let trader = open_trader(&config)?;
            let orders = match token {
                Some(token) => trader.ledger().orders_for_token(token)?,
                None => trader.ledger().orders()?,
            };
            println!("{}", serde_json::to_string_pretty(&orders)?);
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<TesseraConfig> {
    match path {
        Some(path) => TesseraConfig::load_from(path),
        None => TesseraConfig::load(),
    }
}

fn open_trader(config: &TesseraConfig) -> Result<CliTrader> {
    let store = RocksDbStore::open(&config.ledger.path)
        .with_context(|| format!("Failed to open ledger at {}", config.ledger.path))?;
    let mapper = PodMapper::new(MapperOptions {
        all_or_nothing: config.mapper.all_or_nothing,
        worker_threads: config.mapper.worker_threads,
    })?;
    let ingress = IngressClient::new(config.ingress.url.as_str(), config.ingress.timeout())?;

    Ok(Trader::new(
        OrderLedger::new(store),
        FilePodDirectory::new(&config.directory.pods_path),
        mapper,
        ingress,
    ))
}

fn read_order(path: &Path) -> Result<Order> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read order: {}", path.display()))?;
    let request: OrderRequest = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse order: {}", path.display()))?;
    Ok(request.into_order(&mut OsRng)?)
}

/// Token that fires on Ctrl-C so in-flight mapping stops early
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let child = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            child.cancel();
        }
    });
    cancel
}
