//! Registry of resolved deployments and name-to-address lookups.

use alloy_core::primitives::{Address, B256};
use derive_more::Deref;
use serde::{Deserialize, Serialize};

use crate::{ArgValue, DeployError};

/// A confirmed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDeployment {
    pub name: String,
    pub address: Address,
    pub tx_hash: B256,
    /// Artifact the deployment was created from.
    pub artifact: String,
    /// Constructor arguments after dependency resolution.
    #[serde(default)]
    pub args: Vec<ArgValue>,
}

/// Append-only mapping from step name to [`ResolvedDeployment`], in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Deref)]
#[serde(transparent)]
pub struct DeploymentRegistry(Vec<ResolvedDeployment>);

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from persisted entries, rejecting duplicate names.
    pub fn from_entries(
        entries: impl IntoIterator<Item = ResolvedDeployment>,
    ) -> Result<Self, DeployError> {
        let mut registry = Self::new();
        for entry in entries {
            registry.insert(entry)?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, deployment: ResolvedDeployment) -> Result<(), DeployError> {
        if self.contains(&deployment.name) {
            return Err(DeployError::DuplicateStepName(deployment.name));
        }
        self.0.push(deployment);
        Ok(())
    }

    /// Insert or replace the entry with the same name, keeping its position.
    pub(crate) fn upsert(&mut self, deployment: ResolvedDeployment) {
        match self.0.iter_mut().find(|d| d.name == deployment.name) {
            Some(existing) => *existing = deployment,
            None => self.0.push(deployment),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedDeployment> {
        self.0.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.get(name).map(|d| d.address)
    }

    /// First deployment whose name starts with `prefix`.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<&ResolvedDeployment> {
        self.0.iter().find(|d| d.name.starts_with(prefix))
    }

    pub fn entries(&self) -> &[ResolvedDeployment] {
        &self.0
    }

    pub fn into_entries(self) -> Vec<ResolvedDeployment> {
        self.0
    }
}

/// How a name is matched against deployment names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameQuery {
    Exact(String),
    Prefix(String),
}

impl NameQuery {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact(name) | Self::Prefix(name) => name,
        }
    }
}

/// Something that can map deployment names to addresses.
pub trait AddressSource {
    fn lookup(&self, query: &NameQuery) -> Option<Address>;
}

impl AddressSource for DeploymentRegistry {
    fn lookup(&self, query: &NameQuery) -> Option<Address> {
        match query {
            NameQuery::Exact(name) => self.address_of(name),
            NameQuery::Prefix(prefix) => self.find_by_prefix(prefix).map(|d| d.address),
        }
    }
}

/// An ordered list of labelled address sources. The first source with a match wins.
#[derive(Default)]
pub struct LookupChain {
    sources: Vec<(String, Box<dyn AddressSource + Send + Sync>)>,
}

impl LookupChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(
        mut self,
        label: impl Into<String>,
        source: impl AddressSource + Send + Sync + 'static,
    ) -> Self {
        self.sources.push((label.into(), Box::new(source)));
        self
    }
}

impl AddressSource for LookupChain {
    fn lookup(&self, query: &NameQuery) -> Option<Address> {
        self.sources.iter().find_map(|(label, source)| {
            let address = source.lookup(query)?;
            tracing::debug!(name = query.as_str(), source = %label, %address, "Address found");
            Some(address)
        })
    }
}

impl std::fmt::Debug for LookupChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|(label, _)| label))
            .finish()
    }
}
