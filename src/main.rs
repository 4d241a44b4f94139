use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;
use waylay_console::OutputMode;
use waylay_core::gate::{HoldPolicy, InterceptGate};
use waylay_core::session::{CaptureSession, CaptureState};
use waylay_proxy::{HyperForwarder, InterceptProxy, ProxyConfig};

// ─────────────────────────────────────────────────────────────────────────────
// CLI
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, ValueEnum)]
enum Output {
    /// Human-readable console output (default).
    #[default]
    Text,
    /// One JSON object per command result, for scripting.
    Jsonl,
}

impl From<Output> for OutputMode {
    fn from(output: Output) -> Self {
        match output {
            Output::Text => OutputMode::Text,
            Output::Jsonl => OutputMode::Jsonl,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "waylay",
    about = "Intercepting HTTP proxy: hold requests, edit them, then let them go",
    version
)]
struct Cli {
    /// Address the proxy binds to.
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    listen: IpAddr,

    /// Port the proxy listens on.
    #[arg(short, long, default_value_t = 8888)]
    port: u16,

    /// Path extensions treated as dynamic pages, comma separated.
    ///
    /// While capturing, requests for these, for extensionless paths, and every
    /// POST are held; other static-looking paths pass straight through.
    #[arg(long, value_name = "EXT,...", value_delimiter = ',')]
    dynamic_ext: Option<Vec<String>>,

    /// Console output format.
    #[arg(short, long, value_enum, default_value = "text")]
    output: Output,

    /// Start in capturing state instead of waiting for `start`.
    #[arg(long)]
    capture: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Console output owns stdout; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("waylay=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let policy = match cli.dynamic_ext {
        Some(extensions) => HoldPolicy::new(extensions),
        None => HoldPolicy::default(),
    };
    info!(extensions = ?policy.dynamic_extensions(), "hold policy");

    let session = Arc::new(CaptureSession::new());
    let gate = Arc::new(InterceptGate::new(session.clone(), policy));

    let config = ProxyConfig {
        listen_addr: SocketAddr::new(cli.listen, cli.port),
    };
    let mut proxy = InterceptProxy::new(config, gate, HyperForwarder::new());
    proxy.start().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let addr = proxy.listen_addr();
    eprintln!("waylay: proxy listening on {addr}");
    eprintln!("  Set your HTTP proxy to http://{addr}");
    eprintln!("  Example: curl -x http://{addr} http://httpbin.org/index.php");
    eprintln!("  Type `help` for commands, `start` to begin capturing.");

    if cli.capture {
        session.start();
    }

    tokio::select! {
        result = waylay_console::run_console(session.clone(), cli.output.into()) => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    // Held clients would otherwise keep the graceful shutdown waiting.
    if session.state() == CaptureState::Capturing {
        let count = session.release().await.map_err(|e| anyhow::anyhow!("{e}"))?;
        info!(count, "released held requests on exit");
    }

    proxy.stop().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
}
