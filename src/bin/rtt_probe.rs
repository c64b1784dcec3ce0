//! rtt-probe: measure the round-trip time to an echo-gateway `/rtt`
//! endpoint.
//!
//! ```text
//! rtt-probe ws://127.0.0.1:6080
//! rtt-probe --insecure wss://127.0.0.1:6443
//! rtt-probe --ca-cert ssl/websocket_rootCA.crt --samples 5 wss://127.0.0.1:6443
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use echo_gateway::probe::{RttProbe, TrustPolicy};

/// Measure WebSocket round-trip time against a `/rtt` endpoint.
#[derive(Debug, Parser)]
#[command(name = "rtt-probe", version, about)]
struct Cli {
    /// Base URI of the server, e.g. ws://127.0.0.1:6080 or
    /// wss://127.0.0.1:6443. `/rtt` is appended.
    uri: String,

    /// Accept any TLS certificate, including self-signed ones.
    /// For demos only.
    #[arg(long, conflicts_with = "ca_cert")]
    insecure: bool,

    /// Trust only this PEM CA certificate for wss:// connections.
    #[arg(long, value_name = "PATH")]
    ca_cert: Option<PathBuf>,

    /// Number of samples, each taken on a new connection.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    samples: u32,

    /// Print each sample as a JSON line.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn trust_policy(&self) -> TrustPolicy {
        match (&self.ca_cert, self.insecure) {
            (Some(path), _) => TrustPolicy::CustomCa(path.clone()),
            (None, true) => TrustPolicy::AcceptAny,
            (None, false) => TrustPolicy::WebPki,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(uri = %cli.uri, "{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let probe = RttProbe::new(&cli.uri, &cli.trust_policy())?;

    for _ in 0..cli.samples {
        let sample = probe.measure().await?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string(&sample).context("cannot encode sample")?
            );
        } else {
            println!("{sample}");
        }
    }
    Ok(())
}
