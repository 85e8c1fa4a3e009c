// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use clap::Parser;
use mempool_scribe::app::config::Settings;
use mempool_scribe::app::logging::setup_logging;
use mempool_scribe::common::alias::SourceAliasTable;
use mempool_scribe::common::stats::CollectorStats;
use mempool_scribe::services::collector::supervisor;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-source mempool transaction collector")]
struct Cli {
    /// Directory to collect observation CSVs into
    #[arg(long)]
    out: Option<String>,

    /// 6-char collector identifier (part of output filenames); generated if absent
    #[arg(long)]
    uid: Option<String>,

    /// Comma-separated WebSocket URLs of self-hosted EL nodes
    #[arg(long)]
    nodes: Option<String>,

    /// Reference node used to verify incoming transactions
    #[arg(long = "check-node")]
    check_node: Option<String>,

    /// bloXroute auth token (enables the blx connector)
    #[arg(long = "blx-token")]
    blx_token: Option<String>,

    /// Eden auth token (enables the eden connector)
    #[arg(long = "eden-token")]
    eden_token: Option<String>,

    /// Chainbound API key (enables the chainbound connector)
    #[arg(long = "chainbound-api-key")]
    chainbound_api_key: Option<String>,

    /// Print debug output
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Log in production mode (json)
    #[arg(long = "log-prod", default_value_t = false)]
    log_prod: bool,

    /// Serve plaintext counters on this port
    #[arg(long = "metrics-port")]
    metrics_port: Option<u16>,
}

impl Cli {
    fn apply(self, settings: &mut Settings) {
        if self.out.is_some() {
            settings.out = self.out;
        }
        if self.uid.is_some() {
            settings.uid = self.uid;
        }
        if let Some(nodes) = self.nodes {
            settings.nodes = nodes;
        }
        if self.check_node.is_some() {
            settings.check_node_uri = self.check_node;
        }
        if self.blx_token.is_some() {
            settings.blx_auth_header = self.blx_token;
        }
        if self.eden_token.is_some() {
            settings.eden_auth_header = self.eden_token;
        }
        if self.chainbound_api_key.is_some() {
            settings.chainbound_api_key = self.chainbound_api_key;
        }
        if self.metrics_port.is_some() {
            settings.metrics_port = self.metrics_port;
        }
        settings.debug |= self.debug;
        settings.log_prod |= self.log_prod;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };
    cli.apply(&mut settings);

    setup_logging(
        if settings.debug { "debug" } else { "info" },
        settings.log_prod,
    );

    if let Err(e) = settings.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return ExitCode::from(e.exit_code());
    }

    let aliases = SourceAliasTable::from_env();
    if !aliases.is_empty() {
        tracing::info!(count = aliases.len(), "Using source aliases");
    }

    let stats = Arc::new(CollectorStats::default());
    match supervisor::run(&settings, aliases, stats).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Collector failed");
            ExitCode::from(e.exit_code())
        }
    }
}
