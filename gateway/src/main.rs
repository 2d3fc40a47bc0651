//! The headless gateway binary: argument parsing, logging, configuration
//! loading, signal-driven shutdown, and the stdio dispatch loop.
//!
//! Grounded in the shape of `helix-term`'s own CLI entry points even though
//! none of them is a literal match: `helix-term/src/main.rs` parses
//! arguments and hands off to an application loop, `helix-loader` resolves
//! config/runtime directories before anything else runs. This binary plays
//! the same role for a headless process instead of a TUI.

mod config;
mod resolvers;
mod server;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use config::GatewayConfig;
use gateway_core::Gateway;
use gateway_pool::Pool;
use resolvers::{
    ExtensionLanguageResolver, ProviderConfigResolver, RootMarkerLanguageDetector,
    RootMarkerWorkspaceResolver,
};

/// Headless LSP gateway: multiplexes code-intelligence requests onto
/// per-language, per-workspace language-server subprocesses.
#[derive(Parser, Debug)]
#[command(name = "gateway", version, about)]
struct Cli {
    /// Workspace root the gateway serves; child processes inherit it as
    /// their CWD and it roots every relative-path safety check.
    workspace: PathBuf,

    /// Path to a TOML configuration file. Missing is not an error — the
    /// gateway falls back to built-in defaults.
    #[arg(long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Overrides `RUST_LOG` when set (e.g. `debug`, `gateway_pool=trace`).
    #[arg(long)]
    log_level: Option<String>,

    /// Overrides the configured idle-eviction timeout, in milliseconds.
    #[arg(long)]
    idle_timeout_ms: Option<u64>,
}

fn init_logging(log_level: Option<&str>) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("gateway=info,gateway_pool=info"),
    );
    if let Some(level) = log_level {
        builder.parse_filters(level);
    }
    builder.init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("failed to start the async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if !cli.workspace.is_dir() {
        anyhow::bail!("workspace root {} is not a directory", cli.workspace.display());
    }

    let mut gateway_config = GatewayConfig::load(&cli.config)?;
    if let Some(idle_timeout_ms) = cli.idle_timeout_ms {
        gateway_config.pool.idle_timeout_ms = idle_timeout_ms;
    }

    let config_resolver = Arc::new(ProviderConfigResolver::new(&gateway_config));
    let uri_resolver = Arc::new(ExtensionLanguageResolver);
    let pool = Pool::new(config_resolver, uri_resolver.clone(), gateway_config.pool.to_pool_config());

    let gateway = Arc::new(Gateway::new(
        pool.clone(),
        uri_resolver,
        Arc::new(RootMarkerWorkspaceResolver),
        Arc::new(RootMarkerLanguageDetector),
    ));

    log::info!("gateway serving workspace {}", cli.workspace.display());

    let result = tokio::select! {
        result = server::serve_stdio(gateway.clone()) => result,
        _ = wait_for_shutdown_signal() => {
            log::info!("shutdown signal received");
            Ok(())
        }
    };

    log::info!("disposing all language servers");
    pool.dispose_all().await;

    result
}

/// Resolves once either Ctrl-C or (on Unix) SIGTERM arrives, driving the
/// clean `disposeAll` shutdown path the embedding program is expected to
/// run before exiting.
async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                log::warn!("failed to install SIGTERM handler: {err}");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
