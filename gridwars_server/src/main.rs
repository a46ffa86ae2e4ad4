// CLI entry point for the gridwars game server.
//
// Connects to the switch, registers, and serves matches until the process is
// killed. Settings come from an optional JSON file and are then overridden by
// flags. Logging goes through `tracing`; `RUST_LOG` takes precedence over the
// configured `log_filter`.
//
// Usage:
//   gameserver [OPTIONS]
//     --config <FILE>               JSON config file
//     --switch <HOST:PORT>          Switch address (default: 127.0.0.1:3000)
//     --service-name <NAME>         REGISTER service name
//     --service-key <KEY>           REGISTER service key
//     --challenge-interval-ms <MS>  Match scheduling period
//     --purge-interval-ms <MS>      Mailbox sweep period
//     --mailbox-ttl-ms <MS>         Mailbox entry lifetime

use std::path::PathBuf;
use std::thread;

use clap::Parser;
use gridwars_server::{ServerConfig, start_server};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gameserver", about = "Game-server node for the gridwars switch")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long = "switch")]
    switch_addr: Option<String>,
    #[arg(long)]
    service_name: Option<String>,
    #[arg(long)]
    service_key: Option<String>,
    #[arg(long)]
    challenge_interval_ms: Option<u64>,
    #[arg(long)]
    purge_interval_ms: Option<u64>,
    #[arg(long)]
    mailbox_ttl_ms: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, gridwars_server::error::ServerError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(addr) = self.switch_addr {
            config.switch_addr = addr;
        }
        if let Some(name) = self.service_name {
            config.service_name = name;
        }
        if let Some(key) = self.service_key {
            config.service_key = key;
        }
        if let Some(ms) = self.challenge_interval_ms {
            config.challenge_interval_ms = ms;
        }
        if let Some(ms) = self.purge_interval_ms {
            config.purge_interval_ms = ms;
        }
        if let Some(ms) = self.mailbox_ttl_ms {
            config.mailbox_ttl_ms = ms;
        }
        Ok(config)
    }
}

fn main() {
    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // The handle stays alive for the life of the process; the threads are
    // torn down when it exits.
    let _handle = match start_server(config) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "failed to start game server");
            std::process::exit(1);
        }
    };

    loop {
        thread::park();
    }
}
