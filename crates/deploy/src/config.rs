use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_CONFIRMATIONS, MULTICALL3_ADDRESS};

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "Stackvm.toml";

/// The default name for the deployment manifest.
pub const MANIFEST_FILENAME: &str = "deploy.toml";

/// Prefix of the environment variables overriding the configuration.
pub const ENV_PREFIX: &str = "STACKVM_";

/// Default address book location: `<data dir>/stackvm/deployments`.
pub fn default_address_book_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stackvm")
        .join("deployments")
}

/// Configuration of a deployment run.
///
/// Layered from defaults, then `Stackvm.toml`, then `STACKVM_*` environment variables, then
/// command line flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Project name, used as the address book namespace.
    pub project: String,
    /// Deployment tag (e.g. `local`, `staging`, `prod`).
    pub tag: String,
    /// JSON-RPC endpoint of the target chain.
    pub rpc_url: String,
    /// Expected chain id. When set, the run aborts if the node reports another one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Sending account. Defaults to the first account managed by the node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<Address>,
    /// Blocks to wait for on every transaction.
    pub confirmations: u64,
    /// Path to the deployment manifest.
    pub manifest: PathBuf,
    /// Directory holding the compiled contract artifacts.
    pub artifacts_dir: PathBuf,
    /// Root of the address books.
    pub address_book_dir: PathBuf,
    /// Multicall3 contract used for setup batches.
    pub multicall_address: Address,
    /// Projects whose deployments can be referenced as externals, looked up in order.
    pub external_projects: Vec<String>,
    /// Resolve missing dependencies from the address books instead of failing.
    pub dependency_fallback: bool,
    /// Sourcify server. Verification is disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_url: Option<String>,
    /// How long to wait for a transaction receipt, in seconds.
    pub receipt_timeout_secs: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            project: "stackvm".to_string(),
            tag: "local".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: None,
            signer: None,
            confirmations: DEFAULT_CONFIRMATIONS,
            manifest: PathBuf::from(MANIFEST_FILENAME),
            artifacts_dir: PathBuf::from("artifacts"),
            address_book_dir: default_address_book_dir(),
            multicall_address: MULTICALL3_ADDRESS,
            external_projects: Vec::new(),
            dependency_fallback: false,
            verifier_url: None,
            receipt_timeout_secs: 300,
        }
    }
}

impl DeployConfig {
    /// The layered configuration, before extraction.
    ///
    /// `path` may be a file or a directory containing [`CONFIG_FILENAME`]. An explicit path must
    /// exist; without one, `./Stackvm.toml` is used when present.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let file = match path {
            Some(path) if !path.exists() => {
                anyhow::bail!("Configuration file or directory not found: {}", path.display())
            }
            Some(path) if path.is_dir() => path.join(CONFIG_FILENAME),
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(CONFIG_FILENAME),
        };

        Ok(Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Load the configuration from its layers.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(path)?
            .extract()
            .context("Failed to load configuration")?;
        tracing::debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a single TOML file, without other layers.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }
}
