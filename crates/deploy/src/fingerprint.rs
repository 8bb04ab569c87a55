use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::{ArgValue, DeploymentPlan};

/// The parts of a step that, when changed, make a previous deployment stale.
#[derive(Debug, Serialize)]
struct StepFingerprint<'a> {
    name: &'a str,
    artifact: &'a str,
    bytecode_hash: String,
    args: &'a [ArgValue],
    depends_on: Vec<(usize, &'a str)>,
    simulate: bool,
}

/// SHA-256 hash of everything in a plan that affects deployed contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub struct PlanFingerprint(String);

impl PlanFingerprint {
    /// Fingerprint a plan.
    ///
    /// The hash is deterministic: the same steps, in the same order, always produce the same
    /// fingerprint.
    pub fn from_plan(plan: &DeploymentPlan) -> Result<Self> {
        let steps = plan
            .steps()
            .iter()
            .map(|step| StepFingerprint {
                name: &step.name,
                artifact: &step.factory.name,
                bytecode_hash: hex::encode(Sha256::digest(&step.factory.bytecode)),
                args: &step.args,
                depends_on: step
                    .depends_on
                    .iter()
                    .map(|d| (d.arg_position, d.deployment_name.as_str()))
                    .collect(),
                simulate: step.run_static_simulation,
            })
            .collect::<Vec<_>>();

        let json = serde_json::to_string(&steps).context("Failed to serialize plan fingerprint")?;
        Ok(Self(hex::encode(Sha256::digest(json.as_bytes()))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Version metadata stored next to the address book of a deployment.
///
/// Used to warn when a plan changed since the deployments it would resume from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentVersion {
    pub plan_hash: PlanFingerprint,
    pub deployed_at: DateTime<Utc>,
    /// Version of the tool that created this deployment
    pub stackvm_version: String,
}

impl DeploymentVersion {
    pub fn new(plan_hash: PlanFingerprint) -> Self {
        Self {
            plan_hash,
            deployed_at: Utc::now(),
            stackvm_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment version")?;

        std::fs::write(path, json).context(format!(
            "Failed to write deployment version to {}",
            path.display()
        ))?;

        Ok(())
    }

    /// Load version metadata, `None` if the file does not exist.
    pub fn load_from_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).context(format!(
            "Failed to read deployment version from {}",
            path.display()
        ))?;

        let version: Self =
            serde_json::from_str(&content).context("Failed to parse deployment version JSON")?;

        Ok(Some(version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContractFactory, DeploymentStep};
    use alloy_core::primitives::U256;
    use tempdir::TempDir;

    fn plan(supply: u64) -> DeploymentPlan {
        let mut plan = DeploymentPlan::new();
        plan.add(
            DeploymentStep::new("Token", ContractFactory::new("Token", vec![0x60u8, 0x80]))
                .arg(U256::from(supply)),
        )
        .unwrap()
        .add(
            DeploymentStep::new("Vault", ContractFactory::new("Vault", vec![0x60u8, 0x01]))
                .arg_ref("Token"),
        )
        .unwrap();
        plan
    }

    #[test]
    fn test_fingerprint_determinism() {
        let a = PlanFingerprint::from_plan(&plan(1000)).unwrap();
        let b = PlanFingerprint::from_plan(&plan(1000)).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_args() {
        let a = PlanFingerprint::from_plan(&plan(1000)).unwrap();
        let b = PlanFingerprint::from_plan(&plan(1001)).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_changes_with_bytecode() {
        let mut other = DeploymentPlan::new();
        other
            .add(
                DeploymentStep::new("Token", ContractFactory::new("Token", vec![0x60u8, 0x81]))
                    .arg(U256::from(1000u64)),
            )
            .unwrap()
            .add(
                DeploymentStep::new("Vault", ContractFactory::new("Vault", vec![0x60u8, 0x01]))
                    .arg_ref("Token"),
            )
            .unwrap();

        assert_ne!(
            PlanFingerprint::from_plan(&plan(1000)).unwrap(),
            PlanFingerprint::from_plan(&other).unwrap()
        );
    }

    #[test]
    fn test_version_roundtrip_and_missing_file() {
        let dir = TempDir::new("stackvm-version").unwrap();
        let path = dir.path().join("local").join("31337.version.json");

        assert!(DeploymentVersion::load_from_file(&path).unwrap().is_none());

        let version = DeploymentVersion::new(PlanFingerprint::from_plan(&plan(1)).unwrap());
        version.save_to_file(&path).unwrap();

        let loaded = DeploymentVersion::load_from_file(&path).unwrap().unwrap();
        assert_eq!(loaded, version);
    }
}
