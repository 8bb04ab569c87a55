use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "stackvm")]
#[command(
    author,
    version,
    about = "Deploy a contract suite, record its addresses and configure it"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "STACKVM_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Stackvm.toml configuration file, or a directory containing one.
    ///
    /// Defaults to ./Stackvm.toml when present. Every setting can also be given as a
    /// STACKVM_<SETTING> environment variable.
    #[arg(long, global = true, alias = "conf", env = "STACKVM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides applied on top of the configuration file and environment.
    #[clap(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy the manifest steps that are not recorded yet, then run the setup calls.
    Deploy {
        /// Redeploy all contracts, ignoring the recorded deployments.
        #[arg(long, env = "STACKVM_REDEPLOY", default_value_t = false)]
        redeploy: bool,

        /// Verify the deployed contracts without asking.
        #[arg(long, conflicts_with = "no_verify")]
        verify: bool,

        /// Skip verification without asking.
        #[arg(long)]
        no_verify: bool,

        /// Answer yes to every question.
        #[arg(short, long)]
        yes: bool,
    },
    /// List the recorded deployments.
    List {
        /// Output format.
        #[arg(long, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

/// Configuration settings that can be set from the command line.
///
/// Unset flags are not serialized, so they leave the lower layers untouched.
#[derive(Debug, Clone, Default, Args, Serialize)]
pub struct ConfigOverrides {
    /// Project name, used as the address book namespace.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Deployment tag.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// The URL of the chain's JSON-RPC endpoint.
    #[arg(long, global = true, alias = "rpc")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,

    /// Expected chain id.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,

    /// Sending account, managed by the node.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<Address>,

    /// Confirmations to wait for on every transaction.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,

    /// Path to the deployment manifest.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,

    /// Directory holding the compiled artifacts.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<PathBuf>,

    /// Root of the address books.
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_book_dir: Option<PathBuf>,
}

impl Command {
    /// `Some(true)` to verify, `Some(false)` to skip, `None` to ask.
    pub fn verify_choice(verify: bool, no_verify: bool) -> Option<bool> {
        match (verify, no_verify) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}
