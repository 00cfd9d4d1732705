use std::path::PathBuf;

pub mod error;
pub mod http;
pub mod logger;
pub mod queue;

/// `<user data dir>/proxy-pool/proxies.json`, falling back to the working directory.
pub fn default_snapshot_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(env!("CARGO_PKG_NAME"))
        .join("proxies.json")
}
