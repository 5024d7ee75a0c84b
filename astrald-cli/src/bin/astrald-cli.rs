use anyhow::{Context as _, Result};
use astrald_identity::Identity;
use astrald_node::Config;
use rand::rngs::OsRng;
use std::path::PathBuf;
use structopt::StructOpt;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(StructOpt, Debug)]
struct Args {
    /// set log levels
    #[structopt(long = "log-level", default_value = "warn", global = true)]
    log_level: Level,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// print the default configuration to the standard output
    DefaultConfig,

    /// generate a new keypair and print its public identity
    GenerateKey {
        /// path of the file to store the secret key in
        #[structopt(long = "output")]
        output: PathBuf,
    },

    /// print a summary of a node's configuration and persisted state
    Status {
        /// path of the node's configuration file
        #[structopt(long = "config")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::from_args();

    let subscriber = FmtSubscriber::builder().with_max_level(args.log_level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let result = match args.cmd {
        Command::DefaultConfig => default_config().await,
        Command::GenerateKey { output } => generate_key(output).await,
        Command::Status { config } => status(config).await,
    };

    if let Err(error) = result {
        eprintln!("{:?}", error);
        std::process::exit(1);
    }
}

async fn default_config() -> Result<()> {
    println!("{}", Config::EXAMPLE);
    Ok(())
}

async fn generate_key(output: PathBuf) -> Result<()> {
    let identity = Identity::generate(OsRng);
    let bytes = identity
        .to_secret_bytes()
        .context("freshly generated identity has no secret key")?;
    std::fs::write(&output, &bytes).with_context(|| format!("cannot write identity file: {}", output.display()))?;

    println!("public identity: {}", identity);
    println!("written to: {}", output.display());
    Ok(())
}

async fn status(config: PathBuf) -> Result<()> {
    let config = Config::from_file(&config).context("cannot load configuration")?;

    println!("listen address: {}", config.network.listen_address);
    println!("dial workers:   {}", config.network.dial_workers);
    println!("identity file:  {}", config.secret.identity.display());

    if config.secret.identity.exists() {
        let bytes = std::fs::read(&config.secret.identity)
            .with_context(|| format!("cannot read identity file: {}", config.secret.identity.display()))?;
        let identity =
            Identity::from_secret_bytes(&bytes).context("identity file is corrupt")?;
        println!("public identity: {}", identity);
    } else {
        println!("public identity: (none yet, generated on first start)");
    }

    println!("configured peers: {}", config.peers.len());
    for peer in &config.peers {
        println!("  {} ({} addresses)", peer.identity, peer.addresses.len());
    }

    Ok(())
}
