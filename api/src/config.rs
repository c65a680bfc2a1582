use std::path::PathBuf;

use clap::{Parser, Subcommand};
use visuasort_convert::ProcessingProfile;
use visuasort_storage::ProviderKind;

#[derive(Debug, Parser)]
#[command(name = "visuasort", about = "Photo gallery image enhancement service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Server(Config),
    /// Administrative utilities
    Admin(crate::cmd::admin::AdminArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CacheKind {
    None,
    Memory,
    Redis,
}

#[derive(Debug, Clone, Parser)]
pub struct Config {
    #[clap(long, env, default_value_t = String::from("127.0.0.1"))]
    pub host: String,
    #[clap(short, long, env, default_value_t = 7205)]
    pub port: u16,

    #[clap(long, env, default_value_t = String::from("production"))]
    pub env: String,

    /// Postgres connection string. Records are kept in memory when unset.
    #[clap(long = "db", env)]
    pub database_url: Option<String>,
    #[clap(long, env, default_value_t = 16)]
    pub db_max_connections: usize,

    #[clap(long, env, default_value = "local", value_parser = parse_provider)]
    pub storage_provider: ProviderKind,
    /// A directory for the local provider, or `bucket[/prefix]` for S3.
    #[clap(long, env, default_value = "./uploads")]
    pub storage_base: String,
    #[clap(long, env)]
    pub s3_endpoint: Option<String>,
    #[clap(long, env)]
    pub s3_region: Option<String>,
    #[clap(long, env)]
    pub s3_access_key_id: Option<String>,
    #[clap(long, env)]
    pub s3_secret_key: Option<String>,

    #[clap(long, env, value_enum, default_value_t = CacheKind::Memory)]
    pub cache: CacheKind,
    #[clap(long, env)]
    pub redis_url: Option<String>,

    /// Concurrent image pipelines. Defaults to the number of CPUs.
    #[clap(long, env)]
    pub workers: Option<usize>,
    #[clap(long, env)]
    pub processing_timeout_secs: Option<u64>,
    #[clap(long, env, default_value = "full")]
    pub processing_profile: ProcessingProfile,
    /// Reject unknown filter names instead of applying no filter.
    #[clap(long, env)]
    pub strict_filters: bool,
    #[clap(long, env, default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,
    #[clap(long, env, default_value_t = String::from(visuasort_convert::DEFAULT_WATERMARK_TEXT))]
    pub watermark_text: String,

    #[clap(long, env, help = "Secret for signing locally issued tokens")]
    pub jwt_secret: Option<String>,
    #[clap(long, env, help = "JSON array of {username, password_hash, role}")]
    pub static_users: Option<String>,
    #[clap(long, env, help = "Path to the identity provider's JWKS")]
    pub managed_identity_jwks: Option<PathBuf>,
    #[clap(long, env)]
    pub managed_identity_issuer: Option<String>,
    #[clap(long, env)]
    pub managed_identity_audience: Option<String>,

    #[clap(long, env)]
    pub imagga_key: Option<String>,
    #[clap(long, env)]
    pub imagga_secret: Option<String>,
    #[clap(long, env, default_value_t = String::from(crate::tagging::IMAGGA_URL))]
    pub imagga_url: String,
    #[clap(long, env)]
    pub huggingface_key: Option<String>,
    #[clap(long, env, default_value_t = String::from(crate::tagging::HUGGINGFACE_URL))]
    pub huggingface_url: String,

    #[clap(long, env)]
    pub honeycomb_team: Option<String>,
    #[clap(long, env, default_value_t = String::from("dev"))]
    pub honeycomb_dataset: String,
}

fn parse_provider(s: &str) -> Result<ProviderKind, String> {
    s.parse().map_err(|e: visuasort_storage::Error| e.to_string())
}

impl Config {
    pub fn production(&self) -> bool {
        self.env != "development" && !cfg!(debug_assertions)
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}
