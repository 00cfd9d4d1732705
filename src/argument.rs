use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;
use clap::{builder::PossibleValue, Parser};

use crate::{
    checker::{Judge, DEFAULT_HTTPS_JUDGE, DEFAULT_HTTP_JUDGE},
    error_context, providers,
    utils::default_snapshot_path,
};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Cli {
    /// Starting and maximum score of a proxy
    #[arg(long, env = "MAX_SCORE", default_value = "50")]
    pub max_score: u32,

    /// Time in seconds before a validation probe gives up
    #[arg(long, env = "TEST_TIMEOUT", default_value = "10")]
    pub test_timeout: u64,

    /// Number of concurrent workers re-checking stored proxies
    #[arg(long, env = "TEST_PROXIES_ASYNC_COUNT", default_value = "10")]
    pub test_proxies_async_count: usize,

    /// Hours between two revalidation cycles
    #[arg(long, env = "TEST_PROXIES_INTERVAL", default_value = "2")]
    pub test_proxies_interval: u64,

    /// Seconds between two ingestion cycles
    #[arg(long, env = "SPIDER_INTERVAL", default_value = "3600")]
    pub spider_interval: u64,

    /// Maximum number of proxies returned per query, 0 for no limit
    #[arg(long, env = "PROXIES_MAX_COUNT", default_value = "0")]
    pub proxies_max_count: usize,

    /// Proxy sources to crawl. By default, all of them
    #[arg(long, env = "PROXIES_SPIDERS", value_delimiter = ',')]
    pub spiders: Vec<String>,

    /// Echo endpoint used for the http probe
    #[arg(long, default_value = DEFAULT_HTTP_JUDGE)]
    pub judge_http: String,

    /// Echo endpoint used for the https probe
    #[arg(long, default_value = DEFAULT_HTTPS_JUDGE)]
    pub judge_https: String,

    /// Address of the query API
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:6860")]
    pub listen: String,

    /// Snapshot file of the proxy store
    #[arg(long, env = "PROXY_DB")]
    pub db: Option<PathBuf>,

    /// Keep the store in memory only
    #[arg(long)]
    pub no_persist: bool,

    /// Accept invalid certificates during the https probe
    #[arg(long)]
    pub no_verify_ssl: bool,

    /// Also write logs to this file
    #[arg(long, env = "LOG_FILENAME")]
    pub log_file: Option<PathBuf>,

    /// Logging level
    #[arg(long = "log", default_value = "info",
        value_parser([
            PossibleValue::new("debug"),
            PossibleValue::new("info"),
            PossibleValue::new("warn"),
            PossibleValue::new("error")
        ])
    )]
    pub log_level: String,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub max_score: u32,
    pub test_timeout: Duration,
    pub workers: usize,
    pub revalidation_interval: Duration,
    pub ingestion_interval: Duration,
    pub proxies_max_count: usize,
    pub spiders: Vec<String>,
    pub judge: Judge,
    pub verify_ssl: bool,
    pub listen: SocketAddr,
    pub db: Option<PathBuf>,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        if cli.max_score == 0 {
            anyhow::bail!("--max-score must be at least 1");
        }
        if cli.test_proxies_async_count == 0 {
            anyhow::bail!("--test-proxies-async-count must be at least 1");
        }
        if cli.test_timeout == 0 {
            anyhow::bail!("--test-timeout must be greater than 0");
        }
        if cli.test_proxies_interval == 0 || cli.spider_interval == 0 {
            anyhow::bail!("cycle intervals must be greater than 0");
        }

        let revalidation_secs = cli
            .test_proxies_interval
            .checked_mul(60 * 60)
            .with_context(|| {
                format!(
                    "--test-proxies-interval {} hours is too large",
                    cli.test_proxies_interval
                )
            })?;

        let spiders = if cli.spiders.is_empty() {
            providers::known_ids()
        } else {
            cli.spiders
                .iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect()
        };

        let db = if cli.no_persist {
            None
        } else {
            Some(
                cli.db
                    .clone()
                    .unwrap_or_else(default_snapshot_path),
            )
        };

        Ok(Settings {
            max_score: cli.max_score,
            test_timeout: Duration::from_secs(cli.test_timeout),
            workers: cli.test_proxies_async_count,
            revalidation_interval: Duration::from_secs(revalidation_secs),
            ingestion_interval: Duration::from_secs(cli.spider_interval),
            proxies_max_count: cli.proxies_max_count,
            spiders,
            judge: Judge::new(&cli.judge_http, &cli.judge_https)?,
            verify_ssl: !cli.no_verify_ssl,
            listen: cli
                .listen
                .parse()
                .with_context(|| format!("invalid listen address {}", cli.listen))
                .context(error_context!())?,
            db,
        })
    }
}
