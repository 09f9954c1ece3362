mod check;

use anyhow::Result;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::account::load_accounts;
use crate::core::api::HttpApiFactory;
use crate::core::config::{FarmConfig, TelegramConfig};
use crate::core::proxy::ProxyPool;
use crate::core::report::ReportSink;
use crate::core::scheduler::CycleScheduler;
use crate::core::terminal::{self, GuideSection, print_error};
use crate::core::timing::{CountdownWaiter, Jitter};
use crate::interfaces::progress::ConsoleProgress;
use crate::interfaces::telegram::TelegramSink;
use crate::interfaces::{FanoutSink, LogSink};
use crate::logging;

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Commands")
        .command("run", "Process every account in a loop (default)")
        .command("check", "Validate config, account and proxy files")
        .command("help", "Show this guide")
        .print();

    GuideSection::new("Flags")
        .command("--config, -c <file>", "Config file (default: farmhand.toml)")
        .command("--data, -d <file>", "Account list, one payload per line")
        .command("--proxies, -p <file>", "Proxy list, user:pass:host:port per line")
        .command("--once", "Run a single cycle, then exit")
        .command("--seed <n>", "Fix the random source for reproducible delays")
        .print();

    println!(
        "\n {} {} [command] [flags]\n",
        style("Usage:").bold(),
        style("farmhand").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RunArgs {
    pub config: Option<PathBuf>,
    pub accounts: Option<PathBuf>,
    pub proxies: Option<PathBuf>,
    pub once: bool,
    pub seed: Option<u64>,
}

pub(crate) fn parse_run_flags(args: &[String], start: usize) -> RunArgs {
    let mut parsed = RunArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--data" | "-d" => {
                if i + 1 < args.len() {
                    parsed.accounts = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--proxies" | "-p" => {
                if i + 1 < args.len() {
                    parsed.proxies = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--seed" => {
                if i + 1 < args.len() {
                    parsed.seed = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--once" => {
                parsed.once = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    parsed
}

/// Config file, then `.env` and process environment, then command-line paths.
pub(crate) async fn load_settings(args: &RunArgs) -> Result<FarmConfig> {
    dotenvy::dotenv().ok();
    let mut config = FarmConfig::load(args.config.as_deref()).await?;
    config.apply_env(|key| std::env::var(key).ok());
    if let Some(accounts) = &args.accounts {
        config.files.accounts = accounts.clone();
    }
    if let Some(proxies) = &args.proxies {
        config.files.proxies = proxies.clone();
    }
    Ok(config)
}

fn build_sink(telegram: &TelegramConfig) -> Arc<dyn ReportSink> {
    match telegram.credentials() {
        Some((token, chat_id)) => {
            info!("Cycle reports will be sent to Telegram chat {}", chat_id);
            let sinks: Vec<Arc<dyn ReportSink>> = vec![
                Arc::new(LogSink) as Arc<dyn ReportSink>,
                Arc::new(TelegramSink::new(token, chat_id)),
            ];
            Arc::new(FanoutSink::new(sinks))
        }
        None => {
            info!("Telegram is not configured; cycle reports go to the log only");
            Arc::new(LogSink)
        }
    }
}

async fn run_farm(args: RunArgs) -> Result<()> {
    let config = load_settings(&args).await?;
    logging::init(&config.log.level, Some(config.log.file.as_path()))?;
    terminal::print_banner();

    let accounts = load_accounts(&config.files.accounts).await?;
    info!(
        "Loaded {} account(s) from {}",
        accounts.len(),
        config.files.accounts.display()
    );
    let proxies = ProxyPool::load(&config.files.proxies).await;
    if proxies.is_empty() {
        info!("No proxies configured, accounts connect directly");
    }

    let factory = Arc::new(HttpApiFactory::new(
        &config.api.base_url,
        Duration::from_secs(config.api.request_timeout_secs),
    ));
    let sink = build_sink(&config.telegram);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current step");
            on_signal.cancel();
        }
    });

    let waiter = Arc::new(CountdownWaiter::new(
        Arc::new(ConsoleProgress::new()),
        cancel.clone(),
    ));
    let jitter = match args.seed {
        Some(seed) => {
            info!("Using fixed random seed {}", seed);
            Jitter::seeded(seed)
        }
        None => Jitter::from_entropy(),
    };

    let mut scheduler = CycleScheduler::new(
        config.files.accounts.clone(),
        proxies,
        factory,
        sink,
        waiter,
        config.schedule.clone(),
        cancel,
    )
    .with_jitter(jitter);
    scheduler.run(args.once).await;
    Ok(())
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("run");

    match cmd {
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        "check" => check::run_check(&parse_run_flags(&args, 2)).await,
        "run" => run_farm(parse_run_flags(&args, 2)).await,
        flag if flag.starts_with('-') => run_farm(parse_run_flags(&args, 1)).await,
        other => {
            print_error(&format!("Unknown command '{}'", other));
            print_help();
            Ok(())
        }
    }
}
