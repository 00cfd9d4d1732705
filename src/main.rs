use std::sync::Arc;

use anyhow::Context;
use argument::{Cli, Settings};
use checker::Checker;
use clap::Parser;
use pool::PoolQuery;
use scheduler::{AdapterFactory, Orchestrator};
use scoring::ScoringPolicy;
use server::{ApiState, Server};
use store::{MemoryStore, SharedStore, Store};
use tokio::runtime;

use crate::utils::logger::{parse_level, setup_logger};

mod argument;
mod checker;
mod pool;
mod providers;
mod proxy;
mod scheduler;
mod scoring;
mod server;
mod store;
mod utils;


async fn open_store(settings: &Settings) -> anyhow::Result<SharedStore> {
    let store = match &settings.db {
        Some(path) => MemoryStore::open(path)
            .await
            .with_context(|| format!("unable to open proxy store {}", path.display()))?,
        None => MemoryStore::new(),
    };
    Ok(Arc::new(store))
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let store = open_store(&settings).await?;
    log::info!("{} proxies in store", store.count().await?);

    let checker = Checker::new(settings.judge.clone(), settings.test_timeout)
        .with_verify_ssl(settings.verify_ssl);
    log::info!("validating proxies against {}", checker.judge);
    if !checker.verify_ssl {
        log::warn!("certificate verification disabled for https probes");
    }

    let spiders = settings.spiders.clone();
    let fetch_timeout = settings.test_timeout;
    let adapters: AdapterFactory =
        Arc::new(move || providers::build_adapters(&spiders, fetch_timeout));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        Arc::new(checker),
        adapters,
        ScoringPolicy::new(settings.max_score),
        settings.workers,
    ));
    let _cycles = orchestrator.start(settings.ingestion_interval, settings.revalidation_interval);

    let state = ApiState {
        pool: PoolQuery::new(Arc::clone(&store)),
        max_count: settings.proxies_max_count,
    };
    let server = Server::new(settings.listen);

    let served = tokio::select! {
        res = server.start(state) => res,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutdown signal received");
            Ok(())
        }
    };

    store
        .persist()
        .await
        .context("unable to write proxy store on shutdown")?;
    served
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logger(Some(parse_level(&cli.log_level)), cli.log_file.as_deref())?;

    let settings = Settings::from_cli(&cli)?;
    log::debug!("{:#?}", settings);
    log::info!(
        "Start maintaining proxy pool from {} sources",
        settings.spiders.len()
    );

    runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("unable to build tokio runtime")?
        .block_on(run(settings))
}
