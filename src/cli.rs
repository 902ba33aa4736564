use clap::{Args, Parser, Subcommand};

use crate::source::orderbook::DEFAULT_REORG_THRESHOLD;
use crate::types::{LogLevel, SyncStream};

#[derive(Parser, Debug)]
#[command(
    name = "dune-sync",
    about = "Incrementally sync orderbook datasets to a durable store and Dune"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Local directory holding per-stream staging state and the run journal
    #[arg(long, env = "VOLUME_PATH", default_value = "data", global = true)]
    pub volume_path: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one incremental sync for a stream
    Sync(SyncArgs),

    /// Show local staging state and recent runs
    Status(StatusArgs),

    /// Print the last synced block derived from the durable store
    LastBlock(LastBlockArgs),

    /// Copy one artifact from the durable store into the current directory
    Download(DownloadArgs),

    /// Delete every artifact of a stream and its local staging directory
    Empty(EmptyArgs),
}

/// Where published artifacts live.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// S3 bucket (credentials from the standard AWS environment)
    #[arg(long, env = "AWS_BUCKET", conflicts_with = "artifact_dir")]
    pub bucket: Option<String>,

    /// Local directory used as the durable store instead of S3
    #[arg(long, env = "ARTIFACT_DIR")]
    pub artifact_dir: Option<String>,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Stream to sync
    #[arg(long, value_enum)]
    pub sync_table: SyncStream,

    /// Stage content and report what would be published without publishing
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Production orderbook database URL
    #[arg(long, env = "PROD_DB_URL")]
    pub prod_db_url: String,

    /// Staging orderbook database URL
    #[arg(long, env = "BARN_DB_URL")]
    pub barn_db_url: Option<String>,

    /// Blocks behind the database head that are considered final
    #[arg(long, default_value_t = DEFAULT_REORG_THRESHOLD)]
    pub reorg_threshold: u64,

    /// IPFS gateway used for content lookups
    #[arg(long, env = "IPFS_GATEWAY", default_value = "https://ipfs.cow.fi")]
    pub ipfs_gateway: String,

    /// Gateway access token
    #[arg(long, env = "IPFS_ACCESS_KEY")]
    pub ipfs_access_key: Option<String>,

    /// App-data API base URLs, tried in order before the gateway
    #[arg(
        long = "app-data-api",
        default_values = ["https://api.cow.fi/mainnet", "https://barn.api.cow.fi/mainnet"]
    )]
    pub app_data_apis: Vec<String>,

    /// Attempts per gateway scheme for each unresolved hash, per run
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Cumulative attempts after which a hash is published without content
    #[arg(long, default_value_t = 100)]
    pub give_up_threshold: u32,

    /// Per-request timeout for content lookups, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub request_timeout_ms: u64,

    /// Content lookups in flight at once
    #[arg(long, default_value_t = 16, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: u16,

    /// Dune API key; without it warehouse mirroring is skipped
    #[arg(long, env = "DUNE_API_KEY")]
    pub dune_api_key: Option<String>,

    /// Dune API base URL
    #[arg(long, env = "DUNE_API_URL", default_value = crate::warehouse::DEFAULT_DUNE_URL)]
    pub dune_api_url: String,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show this stream
    #[arg(long, value_enum)]
    pub sync_table: Option<SyncStream>,

    /// Number of recent runs to show per stream
    #[arg(long, default_value_t = 5)]
    pub runs: u32,
}

#[derive(Args, Debug)]
pub struct LastBlockArgs {
    #[arg(long, value_enum)]
    pub sync_table: SyncStream,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Object key, e.g. app_data/cow_17000000.json
    pub key: String,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug)]
pub struct EmptyArgs {
    #[arg(long, value_enum)]
    pub sync_table: SyncStream,

    /// Skip confirmation prompt
    #[arg(long)]
    pub yes: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_defaults() {
        let cli = Cli::try_parse_from([
            "dune-sync",
            "sync",
            "--sync-table",
            "app_data",
            "--prod-db-url",
            "postgres://localhost/prod",
        ])
        .unwrap();
        assert_eq!(cli.log_level, LogLevel::Info);
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.sync_table, SyncStream::AppData);
        assert!(!args.dry_run);
        assert_eq!(args.reorg_threshold, 65);
        assert_eq!(args.max_retries, 3);
        assert_eq!(args.give_up_threshold, 100);
        assert_eq!(args.request_timeout_ms, 1000);
        assert_eq!(args.concurrency, 16);
        assert_eq!(args.app_data_apis.len(), 2);
    }

    #[test]
    fn test_stream_names() {
        let cli = Cli::try_parse_from([
            "dune-sync",
            "last-block",
            "--sync-table",
            "internal_imbalance",
            "--artifact-dir",
            "/tmp/store",
        ])
        .unwrap();
        let Command::LastBlock(args) = cli.command else {
            panic!("expected last-block");
        };
        assert_eq!(args.sync_table, SyncStream::TokenImbalance);
        assert_eq!(args.store.artifact_dir.as_deref(), Some("/tmp/store"));
    }

    #[test]
    fn test_bucket_and_artifact_dir_conflict() {
        let result = Cli::try_parse_from([
            "dune-sync",
            "last-block",
            "--sync-table",
            "price_feed",
            "--bucket",
            "b",
            "--artifact-dir",
            "/tmp/store",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "dune-sync",
            "status",
            "--log-level",
            "debug",
            "--volume-path",
            "/var/lib/dune-sync",
        ])
        .unwrap();
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.volume_path, "/var/lib/dune-sync");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = Cli::try_parse_from([
            "dune-sync",
            "sync",
            "--sync-table",
            "app_data",
            "--prod-db-url",
            "postgres://localhost/prod",
            "--concurrency",
            "0",
        ]);
        assert!(result.is_err());
    }
}
