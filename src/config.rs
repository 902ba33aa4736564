use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{StoreArgs, SyncArgs};
use crate::content::{ResolverConfig, Strategy};
use crate::ledger::LedgerPolicy;
use crate::retry::RetryConfig;
use crate::store::{ObjectArtifactStore, StoreError};
use crate::types::SyncStream;

/// Expand ~ to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Durable store backend selected on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    S3 { bucket: String },
    Local(PathBuf),
}

impl StoreLocation {
    pub fn from_args(args: &StoreArgs) -> anyhow::Result<Self> {
        match (&args.bucket, &args.artifact_dir) {
            (Some(bucket), None) => Ok(Self::S3 {
                bucket: bucket.clone(),
            }),
            (None, Some(dir)) => Ok(Self::Local(expand_tilde(dir))),
            (Some(_), Some(_)) => anyhow::bail!("--bucket and --artifact-dir are mutually exclusive"),
            (None, None) => anyhow::bail!(
                "No durable store configured: pass --bucket (AWS_BUCKET) or --artifact-dir (ARTIFACT_DIR)"
            ),
        }
    }

    pub fn open(&self) -> Result<ObjectArtifactStore, StoreError> {
        match self {
            Self::S3 { bucket } => ObjectArtifactStore::s3(bucket),
            Self::Local(root) => ObjectArtifactStore::local(root),
        }
    }
}

/// Settings for one `sync` invocation.
pub struct SyncConfig {
    pub stream: SyncStream,
    pub volume: PathBuf,
    pub store: StoreLocation,
    pub prod_db_url: String,
    pub barn_db_url: Option<String>,
    pub ipfs_gateway: String,
    pub ipfs_access_key: Option<String>,
    pub app_data_apis: Vec<String>,
    pub dune_api_key: Option<String>,
    pub dune_api_url: String,
    pub request_timeout: Duration,
    pub reorg_threshold: u64,
    pub policy: LedgerPolicy,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("stream", &self.stream)
            .field("volume", &self.volume)
            .field("store", &self.store)
            .field("prod_db_url", &"<redacted>")
            .field("barn_db_url", &self.barn_db_url.as_ref().map(|_| "<redacted>"))
            .field("ipfs_gateway", &self.ipfs_gateway)
            .field("ipfs_access_key", &self.ipfs_access_key.as_ref().map(|_| "<redacted>"))
            .field("app_data_apis", &self.app_data_apis)
            .field("dune_api_key", &self.dune_api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("reorg_threshold", &self.reorg_threshold)
            .field("policy", &self.policy)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl SyncConfig {
    pub fn from_args(volume_path: &str, args: SyncArgs) -> anyhow::Result<Self> {
        let store = StoreLocation::from_args(&args.store)?;
        if args.max_retries == 0 {
            anyhow::bail!("--max-retries must be at least 1");
        }

        Ok(Self {
            stream: args.sync_table,
            volume: expand_tilde(volume_path),
            store,
            prod_db_url: args.prod_db_url,
            barn_db_url: args.barn_db_url.filter(|url| !url.is_empty()),
            ipfs_gateway: args.ipfs_gateway,
            ipfs_access_key: args.ipfs_access_key.filter(|key| !key.is_empty()),
            app_data_apis: args.app_data_apis,
            dune_api_key: args.dune_api_key.filter(|key| !key.is_empty()),
            dune_api_url: args.dune_api_url,
            request_timeout: Duration::from_millis(args.request_timeout_ms),
            reorg_threshold: args.reorg_threshold,
            policy: LedgerPolicy {
                max_retries: args.max_retries,
                give_up_threshold: args.give_up_threshold,
                concurrency: usize::from(args.concurrency),
            },
            dry_run: args.dry_run,
            no_progress_bar: args.no_progress_bar,
        })
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        let backoff = RetryConfig::default();
        ResolverConfig {
            strategies: Strategy::default_order(&self.app_data_apis, &self.ipfs_gateway),
            gateway_token: self.ipfs_access_key.clone(),
            request_timeout: self.request_timeout,
            base_delay: backoff.base_delay,
            max_delay: backoff.max_delay,
        }
    }

    /// Run journal location inside the volume.
    pub fn journal_path(&self) -> PathBuf {
        journal_path(&self.volume)
    }
}

pub fn journal_path(volume: &Path) -> PathBuf {
    volume.join(crate::state::JOURNAL_FILE_NAME)
}
