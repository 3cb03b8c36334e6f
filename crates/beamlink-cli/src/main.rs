//! beamlink CLI
//!
//! LAN device-session tool: advertise this machine, browse for peers, drop
//! files on a peer, and run the receiving daemon.

mod config;
mod progress;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use console::style;

use beamlink_core::node::NodeConfig;
use beamlink_core::{LinkEvent, LinkNode};
use beamlink_discovery::advertiser::detect_local_ip;
use beamlink_discovery::{BrowseConfig, Browser};
use beamlink_files::engine::EngineConfig;
use beamlink_files::{DropTarget, TransferEngine, TransferEvent};

use config::Config;
use progress::{TransferBar, format_bytes};

/// beamlink - LAN discovery, multi-file drop, clipboard sync
#[derive(Parser)]
#[command(name = "beamlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output (implies --verbose)
    #[arg(short, long)]
    debug: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/beamlink/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the receiving daemon: advertise, accept file drops, log events
    Daemon {
        /// Transfer listen port (0 picks an ephemeral port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Browse for peers on the local network
    Browse {
        /// Only surface this exact instance name (stops on first match)
        #[arg(long)]
        filter: Option<String>,

        /// How long to browse, in seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// Send one or more files to a peer
    Send {
        /// Files to send
        #[arg(required = true)]
        files: Vec<String>,

        /// Recipient endpoint (ip:port)
        #[arg(short, long, required = true)]
        to: String,
    },

    /// Show local node information
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.debug);

    let config = Config::load(&cli.config)?;

    let runtime = tokio::runtime::Runtime::new().context("creating async runtime")?;
    runtime.block_on(async {
        match cli.command {
            Commands::Daemon { port } => run_daemon(config, port).await,
            Commands::Browse { filter, timeout } => run_browse(config, filter, timeout).await,
            Commands::Send { files, to } => run_send(config, files, to).await,
            Commands::Info => run_info(config),
        }
    })
}

fn init_tracing(verbose: bool, debug: bool) {
    let default = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_daemon(config: Config, port: Option<u16>) -> Result<()> {
    let node = LinkNode::new(NodeConfig {
        device_name: config.device_name.clone(),
        device_id: config.device_id.clone(),
        monitor_name: config.monitor_name.clone(),
        service_type: config.service_type.clone(),
        listen_ip: None,
        listen_port: port.unwrap_or(config.listen_port),
        download_dir: config.download_dir.clone(),
        preferred_peer_path: config.preferred_peer_path(),
        ..NodeConfig::default()
    });

    node.start().await?;
    println!(
        "{} advertising as '{}' on port {}, downloads -> {}",
        style("beamlink").green().bold(),
        node.config().device_name,
        node.advertised_port(),
        config.download_dir.display()
    );

    let mut events = node.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n{} shutting down", style("beamlink").green().bold());
                node.stop();
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("{} {n} event(s) dropped", style("warning:").yellow());
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }
}

fn print_event(event: &LinkEvent) {
    match event {
        LinkEvent::StatusChanged(status) => {
            println!("{} session status: {status:?}", style("status").cyan());
        }
        LinkEvent::ClientListChanged(list) => {
            println!("{} {} client(s) attached", style("clients").cyan(), list.len());
            for client in list {
                println!("    {} @ {} ({})", client.name, client.ip, client.id);
            }
        }
        LinkEvent::PeerFound(candidate) => {
            println!(
                "{} {} at {} (monitor '{}')",
                style("found").green(),
                candidate.instance_name,
                candidate.endpoint(),
                candidate.monitor_name
            );
        }
        LinkEvent::ConnectRequested(candidate) => {
            println!(
                "{} connect to {} at {}",
                style("confirm").magenta(),
                candidate.instance_name,
                candidate.endpoint()
            );
        }
        LinkEvent::TransferProgress(p) => {
            println!(
                "{} {} {}/{} ({} of {})",
                style("recv").blue(),
                p.current_file_name,
                p.received_file_count,
                p.total_file_count,
                format_bytes(p.received_size),
                format_bytes(p.total_size),
            );
        }
        LinkEvent::TransferCompleted(session) => {
            println!(
                "{} batch {} complete: {} file(s), {}",
                style("done").green().bold(),
                session.timestamp,
                session.total_file_count,
                format_bytes(session.total_size),
            );
        }
        LinkEvent::TransferFailed { timestamp, code } => {
            println!(
                "{} batch {timestamp} failed with code {code}",
                style("failed").red().bold()
            );
        }
        LinkEvent::ClipboardReceived(payload) => {
            println!(
                "{} clipboard payload ({:?})",
                style("clip").cyan(),
                payload.primary_kind()
            );
        }
        LinkEvent::ClipboardOutbound(_) | LinkEvent::AuthDataRequested { .. } => {}
    }
}

async fn run_browse(config: Config, filter: Option<String>, timeout_secs: u64) -> Result<()> {
    let mut browser = Browser::new()?;
    let mut rx = browser.start(BrowseConfig {
        service_type: config.service_type.clone(),
        filter_instance: filter,
    })?;

    println!(
        "{} browsing '{}' for {timeout_secs}s...",
        style("beamlink").green().bold(),
        config.service_type
    );

    let deadline = tokio::time::sleep(Duration::from_secs(timeout_secs));
    tokio::pin!(deadline);
    let mut found = 0usize;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            candidate = rx.recv() => match candidate {
                Some(candidate) => {
                    found += 1;
                    println!(
                        "  {} {} at {} (monitor '{}', v{})",
                        style("*").green(),
                        style(&candidate.instance_name).bold(),
                        candidate.endpoint(),
                        candidate.monitor_name,
                        candidate.version
                    );
                }
                // Channel closes when a filtered browse hit its match.
                None => break,
            }
        }
    }
    browser.stop();

    if found == 0 {
        println!("  no peers found");
    }
    Ok(())
}

async fn run_send(config: Config, files: Vec<String>, to: String) -> Result<()> {
    let (ip, port) = parse_endpoint(&to)?;
    let paths: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
    for path in &paths {
        if !path.is_file() {
            bail!("not a file: {}", path.display());
        }
    }

    let device_id = if config.device_id.is_empty() {
        beamlink_core::node::config::generate_device_id()
    } else {
        config.device_id.clone()
    };
    let (engine, mut events) = TransferEngine::new(EngineConfig::new(
        config.download_dir.clone(),
        device_id,
        config.device_name.clone(),
        detect_local_ip(),
    ));
    engine.initialize();

    let timestamp = engine
        .request_drop(
            paths,
            DropTarget {
                ip,
                port,
                client_id: to.clone(),
            },
        )
        .map_err(|status| anyhow!("drop rejected: {status:?}"))?;

    let mut bar: Option<TransferBar> = None;
    while let Some(event) = events.recv().await {
        match event {
            TransferEvent::Progress(p) if p.timestamp == timestamp => {
                bar.get_or_insert_with(|| TransferBar::new(p.total_size, p.total_file_count))
                    .update(&p);
            }
            TransferEvent::Completed(session) if session.timestamp == timestamp => {
                if let Some(bar) = &bar {
                    bar.finish();
                }
                println!(
                    "{} sent {} file(s), {}",
                    style("done").green().bold(),
                    session.total_file_count,
                    format_bytes(session.total_size)
                );
                return Ok(());
            }
            TransferEvent::Errored { timestamp: ts, code } if ts == timestamp => {
                if let Some(bar) = &bar {
                    bar.fail(code);
                }
                bail!("transfer failed with code {code}");
            }
            _ => {}
        }
    }
    bail!("transfer engine stopped unexpectedly");
}

fn run_info(config: Config) -> Result<()> {
    println!("{}", style("beamlink node").green().bold());
    println!("  version:      {}", env!("CARGO_PKG_VERSION"));
    println!("  device name:  {}", config.device_name);
    println!("  monitor:      {}", config.monitor_name);
    println!("  service type: {}", config.service_type);
    println!("  local ip:     {}", detect_local_ip());
    println!("  downloads:    {}", config.download_dir.display());

    let store =
        beamlink_core::peer::PreferredPeerStore::new(config.preferred_peer_path());
    match store.load() {
        Some(peer) => println!(
            "  preferred:    {} ({}, last seen {})",
            peer.instance_name, peer.ip, peer.timestamp_ms
        ),
        None => println!("  preferred:    none"),
    }
    Ok(())
}

fn parse_endpoint(endpoint: &str) -> Result<(Ipv4Addr, u16)> {
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("endpoint must be ip:port, got '{endpoint}'"))?;
    let ip = host
        .parse::<Ipv4Addr>()
        .with_context(|| format!("bad IPv4 address '{host}'"))?;
    let port = port
        .parse::<u16>()
        .with_context(|| format!("bad port '{port}'"))?;
    Ok((ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_parsing() {
        assert_eq!(
            parse_endpoint("10.0.0.5:40123").unwrap(),
            (Ipv4Addr::new(10, 0, 0, 5), 40_123)
        );
        assert!(parse_endpoint("10.0.0.5").is_err());
        assert!(parse_endpoint("nope:40123").is_err());
        assert!(parse_endpoint("10.0.0.5:99999").is_err());
    }
}
