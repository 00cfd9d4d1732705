//! The two recurring jobs that keep the pool fresh.
//!
//! Ingestion pulls candidates from every configured source and stores the
//! ones that validate. Revalidation re-checks everything already stored and
//! applies the scoring policy. Each job runs on its own interval; a tick that
//! fires while the previous run of the same job is still busy is skipped.

use std::{future::Future, sync::Arc, time::Duration};

use futures_util::{stream::FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{
    checker::Validate,
    providers::SourceAdapter,
    proxy::Proxy,
    scoring::{ScoringPolicy, Verdict},
    store::{SharedStore, Store},
    utils::queue::TaskQueue,
};

/// Builds a fresh set of adapters for each ingestion run.
pub type AdapterFactory = Arc<dyn Fn() -> Vec<Box<dyn SourceAdapter>> + Send + Sync>;

/// Runs `job` once right away and then `period` after each run finishes.
///
/// Ticks that come due while the job is busy are dropped; the next run is
/// always a full `period` after the previous one ended.
pub async fn run_every<F, Fut>(name: &'static str, period: Duration, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        log::info!("{} started", name);
        let stime = Instant::now();
        job().await;
        interval.reset();
        log::info!("{} finished. Runtime {:?}", name, stime.elapsed());
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub adapters: usize,
    pub failed_adapters: usize,
    pub candidates: usize,
    pub validated: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub store_errors: usize,
}

impl IngestReport {
    fn merge(&mut self, other: IngestReport) {
        self.adapters += other.adapters;
        self.failed_adapters += other.failed_adapters;
        self.candidates += other.candidates;
        self.validated += other.validated;
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.store_errors += other.store_errors;
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RevalidateReport {
    pub checked: usize,
    pub restored: usize,
    pub demoted: usize,
    pub evicted: usize,
    pub store_errors: usize,
}

pub struct Orchestrator {
    store: SharedStore,
    validator: Arc<dyn Validate>,
    adapters: AdapterFactory,
    policy: ScoringPolicy,
    workers: usize,
}

impl Orchestrator {
    pub fn new(
        store: SharedStore,
        validator: Arc<dyn Validate>,
        adapters: AdapterFactory,
        policy: ScoringPolicy,
        workers: usize,
    ) -> Self {
        Orchestrator {
            store,
            validator,
            adapters,
            policy,
            workers: workers.max(1),
        }
    }

    pub async fn ingestion_cycle(&self) -> IngestReport {
        let mut futures = FuturesUnordered::new();
        for adapter in (self.adapters)() {
            let validator = Arc::clone(&self.validator);
            let store = Arc::clone(&self.store);
            let max_score = self.policy.max_score;
            futures.push(tokio::spawn(async move {
                run_one_adapter(adapter, validator, store, max_score).await
            }));
        }

        let mut report = IngestReport::default();
        while let Some(result) = futures.next().await {
            match result {
                Ok(adapter_report) => report.merge(adapter_report),
                Err(e) => {
                    log::error!("adapter task aborted: {}", e);
                    report.adapters += 1;
                    report.failed_adapters += 1;
                }
            }
        }
        if let Err(e) = self.store.persist().await {
            log::error!("unable to persist ingested proxies: {}", e);
            report.store_errors += 1;
        }
        log::info!(
            "ingestion: {} sources ({} failed), {} candidates, {} working, {} inserted, {} duplicates",
            report.adapters,
            report.failed_adapters,
            report.candidates,
            report.validated,
            report.inserted,
            report.duplicates
        );
        report
    }

    pub async fn revalidation_cycle(&self) -> RevalidateReport {
        let proxies = match self.store.list_all().await {
            Ok(proxies) => proxies,
            Err(e) => {
                log::error!("unable to read stored proxies: {}", e);
                return RevalidateReport {
                    store_errors: 1,
                    ..Default::default()
                };
            }
        };

        let queue = TaskQueue::new();
        for proxy in proxies {
            if let Err(e) = queue.put(proxy) {
                log::error!("{:?}", e);
            }
        }
        log::info!("revalidating {} proxies with {} workers", queue.qsize(), self.workers);
        log::debug!("{}", queue);

        let report = Arc::new(Mutex::new(RevalidateReport::default()));
        let mut workers = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let queue = queue.clone();
            let validator = Arc::clone(&self.validator);
            let store = Arc::clone(&self.store);
            let policy = self.policy;
            let report = Arc::clone(&report);
            workers.push(tokio::spawn(async move {
                while let Some(proxy) = queue.get() {
                    let _ticket = queue.ticket();
                    let outcome = check_one_proxy(proxy, &*validator, &*store, policy).await;
                    report.lock().record(outcome);
                }
            }));
        }

        queue.join().await;
        for worker in workers {
            if let Err(e) = worker.await {
                log::error!("revalidation worker aborted: {}", e);
            }
        }

        let mut report = report.lock().clone();
        if let Err(e) = self.store.persist().await {
            log::error!("unable to persist revalidated proxies: {}", e);
            report.store_errors += 1;
        }
        log::info!(
            "revalidation: {} checked, {} restored, {} demoted, {} evicted, {} store errors",
            report.checked,
            report.restored,
            report.demoted,
            report.evicted,
            report.store_errors
        );
        report
    }

    /// Spawns both recurring jobs on the current runtime.
    pub fn start(
        self: Arc<Self>,
        ingestion_period: Duration,
        revalidation_period: Duration,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let ingestion = Arc::clone(&self);
        let revalidation = self;
        vec![
            tokio::spawn(async move {
                run_every("ingestion cycle", ingestion_period, move || {
                    let orchestrator = Arc::clone(&ingestion);
                    async move {
                        orchestrator.ingestion_cycle().await;
                    }
                })
                .await
            }),
            tokio::spawn(async move {
                run_every("revalidation cycle", revalidation_period, move || {
                    let orchestrator = Arc::clone(&revalidation);
                    async move {
                        orchestrator.revalidation_cycle().await;
                    }
                })
                .await
            }),
        ]
    }
}

async fn run_one_adapter(
    adapter: Box<dyn SourceAdapter>,
    validator: Arc<dyn Validate>,
    store: SharedStore,
    max_score: u32,
) -> IngestReport {
    let mut report = IngestReport {
        adapters: 1,
        ..Default::default()
    };
    let mut pages = adapter.candidates();
    while let Some(page) = pages.next().await {
        let candidates = match page {
            Ok(candidates) => candidates,
            Err(e) => {
                log::warn!("Failed to crawl from {}: {:?}", adapter.name(), e);
                report.failed_adapters = 1;
                break;
            }
        };

        for candidate in candidates {
            if candidate.ip.is_empty() {
                continue;
            }
            report.candidates += 1;
            let proxy = validator
                .validate(Proxy::from_candidate(candidate, max_score))
                .await;
            if !proxy.is_working() {
                continue;
            }
            report.validated += 1;
            match store.insert_if_absent(&proxy).await {
                Ok(true) => report.inserted += 1,
                Ok(false) => report.duplicates += 1,
                Err(e) => {
                    log::error!("unable to store {}: {}", proxy, e);
                    report.store_errors += 1;
                }
            }
        }
    }
    report
}

#[derive(Debug)]
enum CheckOutcome {
    Restored,
    Demoted,
    Evicted,
    StoreError,
}

impl RevalidateReport {
    fn record(&mut self, outcome: CheckOutcome) {
        self.checked += 1;
        match outcome {
            CheckOutcome::Restored => self.restored += 1,
            CheckOutcome::Demoted => self.demoted += 1,
            CheckOutcome::Evicted => self.evicted += 1,
            CheckOutcome::StoreError => self.store_errors += 1,
        }
    }
}

async fn check_one_proxy(
    stored: Proxy,
    validator: &dyn Validate,
    store: &dyn Store,
    policy: ScoringPolicy,
) -> CheckOutcome {
    let checked = validator.validate(stored.clone()).await;
    let (result, outcome) = match policy.apply(stored, checked) {
        Verdict::Restore(proxy) => (store.update(&proxy).await, CheckOutcome::Restored),
        Verdict::Demote(proxy) => (store.update(&proxy).await, CheckOutcome::Demoted),
        Verdict::Evict(ip) => (store.delete(&ip).await.map(|_| ()), CheckOutcome::Evicted),
    };
    match result {
        Ok(()) => outcome,
        Err(e) => {
            log::error!("unable to write back revalidated proxy: {}", e);
            CheckOutcome::StoreError
        }
    }
}
