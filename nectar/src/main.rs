use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use farm_core::{
    setup_logger, AccountStore, KeyLoader, ProxyManager, Worker, WorkerRunner,
};
use nectar_bot::config::BotConfig;
use nectar_bot::menu::{print_banner, select_action, MenuAction};
use nectar_bot::worker::{FarmingWorker, RegistrationWorker, WorkerContext};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(long, default_value = "reg.txt")]
    reg_keys: String,
    #[arg(long, default_value = "farm.txt")]
    farm_keys: String,
    #[arg(short, long, default_value = ProxyManager::PROXY_FILE)]
    proxies: String,
    #[arg(long, default_value = "nectar.db")]
    database: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let config = match BotConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {:#}", args.config, e);
            return Ok(());
        }
    };

    let _log_guard = setup_logger(config.log_level());
    // Keep guard alive for file logging
    std::mem::forget(_log_guard);

    info!("Configuration loaded from {}", args.config);

    let reg_keys = KeyLoader::load_keys(&args.reg_keys)?;
    let farm_keys = KeyLoader::load_keys(&args.farm_keys)?;
    if reg_keys.is_empty() && farm_keys.is_empty() {
        error!(
            "No private keys found in {} or {}. Nothing to do.",
            args.reg_keys, args.farm_keys
        );
        return Ok(());
    }
    info!(
        "Loaded {} registration keys and {} farming keys.",
        reg_keys.len(),
        farm_keys.len()
    );

    let proxies = ProxyManager::load_proxies(&args.proxies)?;

    let store = AccountStore::new(&args.database).await?;
    let ctx = WorkerContext::new(store, config.clone(), proxies.clone());

    print_banner(reg_keys.len() + farm_keys.len(), proxies.len());

    loop {
        let action = match select_action() {
            Ok(a) => a,
            Err(_) => {
                // Not a terminal; nothing interactive to do.
                error!("Cannot prompt for a menu selection (not a terminal).");
                break;
            }
        };

        match action {
            MenuAction::Register => {
                if reg_keys.is_empty() {
                    error!("{} is empty, nothing to register.", args.reg_keys);
                    continue;
                }
                let workers = build_workers(&ctx, &reg_keys, |ctx, key, i| {
                    RegistrationWorker::new(ctx, key, i)
                        .map(|w| Box::new(w) as Box<dyn Worker>)
                });
                WorkerRunner::run_workers(
                    workers,
                    config.threads.registration,
                    config.delay_before_start,
                )
                .await?;
            }
            MenuAction::Farm => {
                if farm_keys.is_empty() {
                    error!("{} is empty, nothing to farm.", args.farm_keys);
                    continue;
                }
                let workers = build_workers(&ctx, &farm_keys, |ctx, key, i| {
                    FarmingWorker::new(ctx, key, i).map(|w| Box::new(w) as Box<dyn Worker>)
                });
                WorkerRunner::run_workers(
                    workers,
                    config.threads.farming,
                    config.delay_before_start,
                )
                .await?;
            }
            MenuAction::Stats => {
                let accounts = ctx.store.count_accounts().await?;
                let metrics = ctx.store.metrics_snapshot();
                info!(
                    "{} accounts stored | {} queries ({} errors) this run",
                    accounts, metrics.total_queries, metrics.total_errors
                );
            }
            MenuAction::Exit => break,
        }
    }

    ctx.store.close().await;
    info!("Goodbye.");
    Ok(())
}

fn build_workers<F>(ctx: &Arc<WorkerContext>, keys: &[String], make: F) -> Vec<Box<dyn Worker>>
where
    F: Fn(Arc<WorkerContext>, String, usize) -> Result<Box<dyn Worker>>,
{
    let mut workers = Vec::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        match make(ctx.clone(), key.clone(), i) {
            Ok(worker) => workers.push(worker),
            // Key validation already logs the format requirements.
            Err(e) => error!("Skipping key #{}: {:#}", i + 1, e),
        }
    }
    workers
}
