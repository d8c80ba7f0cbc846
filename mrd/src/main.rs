// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use mr_common::log::{init_file_logger, init_logger};
use mr_common::net::Family;
use mr_sync::iproute::{IpRouteGateway, DEFAULT_IP_BIN, DEFAULT_RULE_PRIORITY};
use mr_sync::podman::{PeersConfig, PodmanPeers, DEFAULT_PODMAN_BIN};
use mr_sync::{Reconciler, DEFAULT_TABLE};
use slog::Logger;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

mod daemon;
mod log;
mod output;
mod signal;

use crate::log::dlog;

const COMPONENT_MRD: &str = "mrd";
const MOD_DAEMON: &str = "daemon";
const UNIT_DAEMON: &str = "daemon";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Mesh route reconciler",
    long_about = None,
    styles = mr_common::cli::cli_style()
)]
struct Cli {
    #[command(flatten)]
    opts: Opts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct Opts {
    /// Policy routing table to manage.
    #[arg(long, env = "MRD_TABLE", default_value_t = DEFAULT_TABLE)]
    table: u32,

    /// Priority of the policy rule that points at the table.
    #[arg(long, env = "MRD_RULE_PRIORITY", default_value_t = DEFAULT_RULE_PRIORITY)]
    rule_priority: u32,

    /// Peer configuration file.
    #[arg(long, env = "MRD_PEERS", default_value = "/etc/meshroute/peers.json")]
    peers: PathBuf,

    /// Manage IPv6 routes in addition to IPv4.
    #[arg(long)]
    ipv6: bool,

    /// Path to the iproute2 `ip` binary.
    #[arg(long, default_value = DEFAULT_IP_BIN)]
    ip_bin: String,

    /// Path to the podman binary.
    #[arg(long, default_value = DEFAULT_PODMAN_BIN)]
    podman_bin: String,

    /// Log to this file instead of stdout.
    #[arg(long)]
    log_file: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile periodically until SIGINT or SIGTERM. SIGUSR1 triggers an
    /// immediate pass.
    Run {
        /// Time between passes, e.g. `30s` or `2m`.
        #[arg(
            long,
            env = "MRD_INTERVAL",
            default_value = "30s",
            value_parser = humantime::parse_duration
        )]
        interval: Duration,
    },
    /// Run a single pass and print what changed.
    Once,
    /// Print the changes a pass would make without making them.
    Plan,
}

type SystemReconciler = Reconciler<PodmanPeers, IpRouteGateway>;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let log = match &cli.opts.log_file {
        Some(path) => init_file_logger(path)
            .with_context(|| format!("open log file {path}"))?,
        None => init_logger(),
    };

    let r = reconciler(&cli.opts, &log)?;

    match cli.command {
        Commands::Run { interval } => {
            let (tx, rx) = tokio::sync::mpsc::channel(16);
            signal::handle_signals(tx, log.clone())
                .context("install signal handlers")?;
            dlog!(log, info, "starting mrd"; "table" => r.table_id());
            daemon::run(&r, interval, rx, &log).await;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Once => {
            let report = r.reconcile().await?;
            output::print_report(std::io::stdout(), &report)?;
            if report.is_clean() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Plan => {
            let plan = r.plan().await?;
            output::print_plan(std::io::stdout(), &plan, r.table_id())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn reconciler(opts: &Opts, log: &Logger) -> anyhow::Result<SystemReconciler> {
    let config = PeersConfig::load(&opts.peers).with_context(|| {
        format!("load peer configuration {}", opts.peers.display())
    })?;

    let mut families = vec![Family::V4];
    if opts.ipv6 {
        families.push(Family::V6);
    }

    let peers = PodmanPeers::new(&opts.podman_bin, config.peers, log.clone());
    let table = IpRouteGateway::new(
        &opts.ip_bin,
        families,
        opts.rule_priority,
        log.clone(),
    );
    Ok(Reconciler::new(peers, table, opts.table, log.clone()))
}
