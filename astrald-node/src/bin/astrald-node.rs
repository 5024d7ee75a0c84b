use anyhow::Context as _;
use astrald_node::{Config, Node};
use astrald_router::events;
use std::path::PathBuf;
use structopt::StructOpt;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(StructOpt, Debug)]
struct Args {
    /// set log levels
    #[structopt(long = "log-level", default_value = "info", global = true)]
    log_level: Level,

    /// path of the node's configuration file
    #[structopt(long = "config")]
    config: PathBuf,

    /// directory for persisted state (address tracker)
    #[structopt(long = "data-dir", default_value = "data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    if let Err(error) = main_run().await {
        eprintln!("{:?}", error);
        std::process::exit(1);
    }
}

async fn main_run() -> anyhow::Result<()> {
    let args = Args::from_args();

    let subscriber = FmtSubscriber::builder().with_max_level(args.log_level).finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let config = Config::from_file(&args.config).context("cannot load initial settings")?;
    let db = sled::open(&args.data_dir).context("cannot open data directory")?;
    let (events, _) = events::channel(events::DEFAULT_CAPACITY);

    let node = Node::start(config, &db, events).await.context("cannot start node")?;
    tracing::info!(peer = %node.network().local_id(), "node started");

    println!("ctrl-c to stop the node...");
    tokio::signal::ctrl_c().await.context("failed waiting for ctrl-c")?;
    tracing::info!("shutting down via ctrl-c");

    Ok(())
}
