//! Address-book persistence for deployment registries.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::{DeploymentRegistry, ResolvedDeployment};

/// Storage of registries keyed by a run tag and a chain id.
pub trait AddressBook {
    /// Persist `registry`. Entries already stored under the same name are replaced.
    fn save(&self, tag: &str, chain_id: u64, registry: &DeploymentRegistry) -> Result<()>;

    /// Load the registry stored under `tag` for `chain_id`, empty if nothing was saved yet.
    fn load(&self, tag: &str, chain_id: u64) -> Result<DeploymentRegistry>;
}

/// On-disk format of an address-book file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct AddressBookFile {
    project: String,
    tag: String,
    chain_id: u64,
    deployments: Vec<ResolvedDeployment>,
}

/// JSON address book laid out as `<root>/<project>/<tag>/<chain_id>.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonAddressBook {
    root: PathBuf,
    project: String,
}

impl JsonAddressBook {
    pub fn new(root: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            project: project.into(),
        }
    }

    /// The address book of another project sharing the same root.
    pub fn for_project(&self, project: impl Into<String>) -> Self {
        Self::new(self.root.clone(), project)
    }

    pub fn path(&self, tag: &str, chain_id: u64) -> PathBuf {
        self.root
            .join(&self.project)
            .join(tag)
            .join(format!("{chain_id}.json"))
    }

    fn read_file(&self, path: &Path) -> Result<Option<AddressBookFile>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read address book {}", path.display()))?;
        let file = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse address book {}", path.display()))?;
        Ok(Some(file))
    }

    fn lock(path: &Path) -> Result<File> {
        let lock_path = path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;
        lock.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", lock_path.display()))?;
        Ok(lock)
    }
}

impl AddressBook for JsonAddressBook {
    fn save(&self, tag: &str, chain_id: u64, registry: &DeploymentRegistry) -> Result<()> {
        let path = self.path(tag, chain_id);
        let parent = path
            .parent()
            .context("Address book path must have a parent directory")?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;

        let lock = Self::lock(&path)?;

        let mut merged = match self.read_file(&path)? {
            Some(file) => DeploymentRegistry::from_entries(file.deployments)
                .with_context(|| format!("Corrupted address book {}", path.display()))?,
            None => DeploymentRegistry::new(),
        };
        for deployment in registry.iter() {
            merged.upsert(deployment.clone());
        }

        let file = AddressBookFile {
            project: self.project.clone(),
            tag: tag.to_string(),
            chain_id,
            deployments: merged.into_entries(),
        };
        let content =
            serde_json::to_string_pretty(&file).context("Failed to serialize address book")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write address book {}", path.display()))?;

        lock.unlock().context("Failed to release address book lock")?;
        tracing::debug!(path = %path.display(), "Address book written");
        Ok(())
    }

    fn load(&self, tag: &str, chain_id: u64) -> Result<DeploymentRegistry> {
        let path = self.path(tag, chain_id);
        match self.read_file(&path)? {
            Some(file) => {
                if file.chain_id != chain_id {
                    anyhow::bail!(
                        "Address book {} is for chain {}, expected {}",
                        path.display(),
                        file.chain_id,
                        chain_id
                    );
                }
                DeploymentRegistry::from_entries(file.deployments)
                    .with_context(|| format!("Corrupted address book {}", path.display()))
            }
            None => {
                tracing::debug!(path = %path.display(), "No address book yet");
                Ok(DeploymentRegistry::new())
            }
        }
    }
}
