//! Best-effort source verification.

use anyhow::Context;
use serde_json::Value;

use crate::{ArtifactSource, ResolvedDeployment, Verifier, rpc::create_client};

/// Default public Sourcify server.
pub const SOURCIFY_DEFAULT_URL: &str = "https://sourcify.dev/server";

/// Outcome of a verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub verified: Vec<String>,
    /// Deployment name and failure reason.
    pub failed: Vec<(String, String)>,
}

impl VerificationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// A report where every deployment failed for the same `reason`.
    pub fn unavailable(deployments: &[ResolvedDeployment], reason: &str) -> Self {
        Self {
            verified: vec![],
            failed: deployments
                .iter()
                .map(|d| (d.name.clone(), reason.to_string()))
                .collect(),
        }
    }
}

/// Submit `deployments` for verification, one at a time.
pub async fn verify_deployments<V: Verifier>(
    verifier: &V,
    deployments: &[ResolvedDeployment],
) -> VerificationReport {
    let mut report = VerificationReport::default();

    for deployment in deployments {
        match verifier.verify(deployment).await {
            Ok(()) => {
                tracing::info!(name = %deployment.name, address = %deployment.address, "✓ Verified");
                report.verified.push(deployment.name.clone());
            }
            Err(e) => {
                tracing::warn!(name = %deployment.name, error = %format!("{e:#}"), "Verification failed");
                report.failed.push((deployment.name.clone(), format!("{e:#}")));
            }
        }
    }

    report
}

/// Submits artifact metadata to a Sourcify server.
pub struct SourcifyVerifier<S> {
    client: reqwest::Client,
    server_url: String,
    chain_id: u64,
    artifacts: S,
}

impl<S: ArtifactSource> SourcifyVerifier<S> {
    pub fn new(server_url: impl Into<String>, chain_id: u64, artifacts: S) -> anyhow::Result<Self> {
        Ok(Self {
            client: create_client()?,
            server_url: server_url.into().trim_end_matches('/').to_string(),
            chain_id,
            artifacts,
        })
    }

    fn request_body(&self, deployment: &ResolvedDeployment, metadata: &str) -> Value {
        serde_json::json!({
            "address": deployment.address,
            "chain": self.chain_id.to_string(),
            "files": { "metadata.json": metadata },
        })
    }
}

impl<S: ArtifactSource + Send + Sync> Verifier for SourcifyVerifier<S> {
    async fn verify(&self, deployment: &ResolvedDeployment) -> anyhow::Result<()> {
        let factory = self.artifacts.get_contract_factory(&deployment.artifact)?;
        let metadata = factory
            .metadata
            .with_context(|| format!("Artifact {} carries no metadata", deployment.artifact))?;

        let response: Value = self
            .client
            .post(format!("{}/verify", self.server_url))
            .json(&self.request_body(deployment, &metadata))
            .send()
            .await
            .context("Failed to reach verification server")?
            .json()
            .await
            .context("Failed to parse verification response")?;

        if let Some(error) = response.get("error").and_then(Value::as_str) {
            anyhow::bail!("Verification rejected: {error}");
        }

        let status = response["result"][0]["status"].as_str().unwrap_or("unknown");
        match status {
            "perfect" | "partial" => {
                tracing::debug!(name = %deployment.name, status, "Verification accepted");
                Ok(())
            }
            other => anyhow::bail!("Unexpected verification status: {other}"),
        }
    }
}
