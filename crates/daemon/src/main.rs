/// bdxnet daemon
///
/// Command line front end for the naming and directory layer:
/// - Classifies `.bdx` / `.mnode` addresses
/// - Talks to the directory daemon for block height, LNS names and the
///   node's identity key
/// - Keeps a session open and refreshes the master node list periodically

use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn, Level};

use bdxnet_common::{ClientConfig, PeerStats};
use bdxnet_core::{
    is_valid_name, parse_address, DirectoryClient, FramedTransport, ParsedAddress, Router,
    RouterId,
};

/// How often the running daemon refreshes the master node list
const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config();

    tracing_subscriber::fmt()
        .with_max_level(if config.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("run");

    match command {
        "help" | "--help" | "-h" => print_help(),
        "version" | "--version" | "-v" => {
            println!("bdxnet daemon v{}", env!("CARGO_PKG_VERSION"));
        }
        "parse" => {
            let address = args.get(2).ok_or_else(|| anyhow!("usage: parse <address>"))?;
            print_address(address);
        }
        "height" => {
            let (client, _router) = connect(&config).await?;
            println!("{}", client.sync_block_height().await?);
        }
        "resolve" => {
            let name = args.get(2).ok_or_else(|| anyhow!("usage: resolve <name.bdx>"))?;
            if !is_valid_name(name) {
                bail!("{} is not a valid LNS name", name);
            }
            let (client, _router) = connect(&config).await?;
            match client.resolve_lns_name(name).await {
                Some(address) => println!("{}", address),
                None => bail!("{} is not registered", name),
            }
        }
        "identity" => {
            let (client, _router) = connect(&config).await?;
            let keypair = tokio::task::spawn_blocking(move || client.obtain_identity_key()).await??;
            println!("{}", RouterId::from_public_key(&keypair.public_key()));
        }
        "run" => run(&config).await?,
        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Run with 'help' to see available commands");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Load `bdxnet.toml`, writing the defaults out if it does not exist yet
fn load_config() -> ClientConfig {
    let config_path = PathBuf::from("bdxnet.toml");
    if config_path.exists() {
        match ClientConfig::from_file(&config_path) {
            Ok(config) => return config,
            Err(e) => eprintln!("Ignoring {:?}: {}", config_path, e),
        }
        return ClientConfig::default();
    }

    let config = ClientConfig::default();
    if let Err(e) = config.to_file(&config_path) {
        eprintln!("Failed to save default config: {}", e);
    }
    config
}

/// The router side of the session: keeps the whitelist and peer statistics
#[derive(Default)]
struct DaemonRouter {
    whitelist: RwLock<Vec<RouterId>>,
    stats: RwLock<HashMap<RouterId, PeerStats>>,
}

impl Router for DaemonRouter {
    fn set_router_whitelist(&self, routers: Vec<RouterId>) {
        info!("Router whitelist now has {} entries", routers.len());
        if let Ok(mut whitelist) = self.whitelist.write() {
            *whitelist = routers;
        }
    }

    fn peer_stats(&self, router_id: &RouterId) -> Option<PeerStats> {
        self.stats.read().ok()?.get(router_id).cloned()
    }
}

async fn connect(config: &ClientConfig) -> Result<(Arc<DirectoryClient>, Arc<DaemonRouter>)> {
    let router = Arc::new(DaemonRouter::default());
    let dyn_router: Arc<dyn Router> = router.clone();
    let client = DirectoryClient::new(
        Arc::new(FramedTransport::from_config(config)),
        Arc::downgrade(&dyn_router),
        tokio::runtime::Handle::current(),
        config.clone(),
    );

    info!("Connecting to directory daemon at {}", config.directory_url);
    client.connect(&config.directory_url).await?;
    Ok((client, router))
}

async fn run(config: &ClientConfig) -> Result<()> {
    info!("Starting bdxnet daemon v{}", env!("CARGO_PKG_VERSION"));

    let (client, router) = connect(config).await?;

    let identity = {
        let client = client.clone();
        tokio::task::spawn_blocking(move || client.obtain_identity_key()).await??
    };
    info!(
        "Running as {}",
        RouterId::from_public_key(&identity.public_key())
    );

    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
    refresh.tick().await;

    info!("Daemon is running. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            _ = refresh.tick() => {
                if !client.update_master_node_list() {
                    warn!("Master node list refresh skipped");
                }
                info!(
                    "Block height {}, {} master nodes",
                    client.block_height(),
                    client.master_nodes().len()
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    drop(router);
    info!("Daemon stopped");
    Ok(())
}

fn print_address(address: &str) {
    match parse_address(address) {
        ParsedAddress::Router(router) => {
            println!("Relay:    {}", router);
            println!("Hex:      {}", router.to_hex());
            println!("DHT key:  {}", router.to_key().to_hex());
        }
        ParsedAddress::Service(service) => {
            println!("Service:  {}", service);
            if !service.subdomain().is_empty() {
                println!("Subdomain: {}", service.subdomain());
            }
            println!("Hex:      {}", hex::encode(service.as_bytes()));
            println!("DHT key:  {}", service.to_key().to_hex());
        }
        ParsedAddress::Unrecognized => println!("Unrecognized address: {}", address),
    }
}

fn print_help() {
    println!("bdxnet daemon - naming and directory client");
    println!();
    println!("USAGE:");
    println!("    bdxnet-daemon [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("    run                 Keep a directory session open (default)");
    println!("    parse <address>     Classify a .bdx or .mnode address");
    println!("    resolve <name.bdx>  Look up an LNS name");
    println!("    height              Print the directory daemon's block height");
    println!("    identity            Fetch this node's identity key");
    println!("    help                Show this help message");
    println!("    version             Show version information");
    println!();
    println!("CONFIGURATION:");
    println!("    bdxnet.toml in the working directory, created with defaults");
    println!("    on first run.");
}
