mod classify;
mod config;
mod controller;
mod fetch;
mod format;
mod http;
mod metrics;
mod model;
mod render;
mod state;
mod view;

use axum::serve;
use clap::Parser;
use config::Config;
use controller::{PollController, RefreshOutcome};
use fetch::{Fetcher, ProcessRunner};
use metrics::Metrics;
use model::Variant;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "entity-monitord")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Override the configured entity variant.
    #[arg(long, value_enum)]
    variant: Option<Variant>,
    /// Start with auto-refresh running.
    #[arg(long)]
    auto_refresh: bool,
    /// Poll once, print the status line and markup, then exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };
    if let Some(variant) = cli.variant {
        if variant != cfg.variant && cfg.command.is_some() {
            warn!(
                variant = variant.as_str(),
                "--variant overrides the configured variant but command is set explicitly; \
                 make sure it prints {} data",
                variant.as_str()
            );
        }
        cfg.variant = variant;
    }
    if cli.auto_refresh {
        cfg.auto_refresh_on_start = true;
    }

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialise metrics");
            std::process::exit(1);
        }
    };

    let argv = cfg.command_argv();
    info!(
        listen = %cfg.listen,
        variant = cfg.variant.as_str(),
        command = ?argv,
        refresh_interval = %humantime::format_duration(cfg.refresh_interval),
        "starting entity-monitord"
    );

    let fetcher = Fetcher::new(cfg.variant, argv, Arc::new(ProcessRunner));
    let controller = PollController::new(fetcher, cfg.refresh_interval, metrics.clone());

    if cli.once {
        std::process::exit(run_once(&controller).await);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = {
        let listen = cfg.listen.clone();
        let app = http::build_router(metrics.clone(), controller.clone());
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let addr: SocketAddr = match listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %listen, "invalid listen address");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "failed to bind HTTP listener");
                    return;
                }
            };

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        })
    };

    if cfg.auto_refresh_on_start {
        controller.toggle_auto_refresh().await;
    } else if cfg.refresh_on_start {
        controller.spawn_refresh();
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for Ctrl+C");
    }
    info!("received Ctrl+C, shutting down");

    controller.teardown().await;
    let _ = shutdown_tx.send(true);
    let _ = http_task.await;
}

/// What `--once` prints and the process exit code.
#[derive(Debug, PartialEq, Eq)]
struct OnceReport {
    stdout: Vec<String>,
    stderr: Option<String>,
    exit_code: i32,
}

async fn poll_once(controller: &PollController) -> OnceReport {
    let outcome = controller.refresh().await;
    let view = controller.view().await;
    let stdout = view
        .status_line
        .into_iter()
        .chain(view.markup_html)
        .collect();
    match outcome {
        RefreshOutcome::Failed(banner) => OnceReport {
            stdout,
            stderr: Some(banner),
            exit_code: 1,
        },
        RefreshOutcome::Rendered | RefreshOutcome::Stale => OnceReport {
            stdout,
            stderr: None,
            exit_code: 0,
        },
    }
}

async fn run_once(controller: &PollController) -> i32 {
    let report = poll_once(controller).await;
    for line in &report.stdout {
        println!("{line}");
    }
    if let Some(banner) = &report.stderr {
        eprintln!("{banner}");
    }
    report.exit_code
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::DEFAULT_REFRESH_INTERVAL;
    use crate::fetch::test_support::ScriptedRunner;

    fn controller(runner: Arc<ScriptedRunner>) -> PollController {
        let metrics = Metrics::new().expect("metrics");
        let fetcher = Fetcher::new(Variant::Bridges, vec!["bridge_monitor".to_string()], runner);
        PollController::new(fetcher, DEFAULT_REFRESH_INTERVAL, metrics)
    }

    #[tokio::test]
    async fn once_prints_status_line_and_markup() {
        let runner = ScriptedRunner::new(
            r#"{"bridges":[{"name":"br0","status":"up"}],"bridge_count":1,"timestamp":null}"#,
        );
        let report = poll_once(&controller(runner)).await;

        assert_eq!(report.exit_code, 0);
        assert_eq!(report.stderr, None);
        assert_eq!(report.stdout.len(), 2);
        assert_eq!(report.stdout[0], "Last updated: Unknown (1 bridges found)");
        assert!(report.stdout[1].starts_with("<div class=\"bridge-grid\">"));
        assert!(report.stdout[1].contains("br0"));
    }

    #[tokio::test]
    async fn once_failure_exits_nonzero_with_banner() {
        let runner = ScriptedRunner::new("{");
        runner.push_err("exit status: 2");
        let report = poll_once(&controller(runner)).await;

        assert_eq!(report.exit_code, 1);
        assert!(report.stdout.is_empty());
        let banner = report.stderr.expect("banner");
        assert!(banner.starts_with("Failed to retrieve bridge data: "), "{banner}");
    }
}
