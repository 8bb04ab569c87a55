use std::{path::PathBuf, time::Duration};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};

use crate::{
    AddressBook, ArtifactSource, BatchAggregator, ChainClient, Confirm, DeployConfig,
    DeployContext, DeploymentExecutor, DeploymentRegistry, DeploymentVersion, JsonAddressBook,
    JsonArtifacts, LookupChain, Manifest, ManifestEnv, Multicall3, PlanFingerprint,
    ResolvedDeployment, RpcChain, SetupBatch, SetupOutcome, SourcifyVerifier, VerificationReport,
    Verifier, execute_setup,
};

/// Per-run switches that are not part of the configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Ignore the address book and deploy every step again.
    pub redeploy: bool,
    /// Verify without asking (`Some(true)`), skip (`Some(false)`), or ask (`None`).
    pub verify: Option<bool>,
}

/// What a deployment run did.
#[derive(Debug, Clone)]
pub struct DeploymentSummary {
    pub chain_id: u64,
    pub tag: String,
    pub signer: Address,
    /// Deployments made by this run, in order.
    pub deployed: Vec<ResolvedDeployment>,
    /// Steps skipped because the address book already had them.
    pub reused: Vec<String>,
    /// Every deployment known for this project, tag and chain after the run.
    pub registry: DeploymentRegistry,
    pub verification: Option<VerificationReport>,
    pub setup: SetupOutcome,
}

/// Runs a manifest against a chain, from configuration to post-deployment setup.
#[derive(Debug, Clone)]
pub struct Deployer {
    pub config: DeployConfig,
}

impl Deployer {
    pub fn new(config: DeployConfig) -> Self {
        Self { config }
    }

    pub fn address_book(&self) -> JsonAddressBook {
        JsonAddressBook::new(&self.config.address_book_dir, &self.config.project)
    }

    /// Path of the version file stored next to the address book of `chain_id`.
    pub fn version_path(&self, chain_id: u64) -> PathBuf {
        self.address_book()
            .path(&self.config.tag, chain_id)
            .with_extension("version.json")
    }

    /// Address sources for external deployments: the configured projects in order, then this
    /// project's own address book.
    fn externals(&self, chain_id: u64, own: &DeploymentRegistry) -> Result<LookupChain> {
        let book = self.address_book();
        let mut lookup = LookupChain::new();
        for project in &self.config.external_projects {
            let registry = book
                .for_project(project)
                .load(&self.config.tag, chain_id)
                .with_context(|| format!("Failed to load deployments of {project}"))?;
            tracing::debug!(project, deployments = registry.len(), "External project loaded");
            lookup = lookup.with_source(project.clone(), registry);
        }
        Ok(lookup.with_source(self.config.project.clone(), own.clone()))
    }

    async fn connect(&self) -> Result<(RpcChain, u64)> {
        let signer = match self.config.signer {
            Some(signer) => signer,
            None => RpcChain::default_account(&self.config.rpc_url).await?,
        };
        let chain = RpcChain::new(&self.config.rpc_url, signer)?
            .with_receipt_timeout(Duration::from_secs(self.config.receipt_timeout_secs));

        let chain_id = chain
            .chain_id()
            .await
            .with_context(|| format!("Failed to reach {}", self.config.rpc_url))?;
        if let Some(expected) = self.config.chain_id
            && expected != chain_id
        {
            anyhow::bail!("Node reports chain {chain_id}, configuration expects {expected}");
        }

        Ok((chain, chain_id))
    }

    /// Connect to the configured node and run the manifest against it.
    pub async fn deploy(
        &self,
        options: DeployOptions,
        prompt: &impl Confirm,
    ) -> Result<DeploymentSummary> {
        let (chain, chain_id) = self.connect().await?;
        let signer = chain.signer();
        let aggregator = Multicall3::new(chain.clone(), self.config.multicall_address);
        let ctx = DeployContext::new(chain, aggregator, signer, chain_id)
            .with_confirmations(self.config.confirmations);

        let artifacts = JsonArtifacts::new(&self.config.artifacts_dir);
        let verifier = self
            .config
            .verifier_url
            .as_deref()
            .map(|url| SourcifyVerifier::new(url, chain_id, artifacts.clone()));

        self.run(&ctx, &artifacts, verifier, options, prompt).await
    }

    /// Run the manifest on `ctx`.
    ///
    /// `verifier` is `None` when no verification server is configured, and an error when one is
    /// configured but could not be set up. Verification problems end up in the summary and never
    /// abort the run.
    pub async fn run<C, A, V>(
        &self,
        ctx: &DeployContext<C, A>,
        artifacts: &impl ArtifactSource,
        verifier: Option<Result<V>>,
        options: DeployOptions,
        prompt: &impl Confirm,
    ) -> Result<DeploymentSummary>
    where
        C: ChainClient,
        A: BatchAggregator,
        V: Verifier,
    {
        let (signer, chain_id) = (ctx.signer, ctx.chain_id);
        let tag = self.config.tag.as_str();
        tracing::info!(
            project = %self.config.project,
            tag,
            chain_id,
            %signer,
            "Starting deployment process..."
        );

        let book = self.address_book();
        let existing = book.load(tag, chain_id)?;
        let externals = self.externals(chain_id, &existing)?;

        let manifest = Manifest::load(&self.config.manifest)?;
        let env = ManifestEnv {
            signer,
            chain_id,
            externals: &externals,
        };
        let (plan, setup) = manifest.compile(&env, artifacts)?;
        let fingerprint = PlanFingerprint::from_plan(&plan)?;

        let version_path = self.version_path(chain_id);
        let (pending, seed) = if options.redeploy {
            tracing::info!("Redeploying every step");
            (plan.clone(), DeploymentRegistry::new())
        } else {
            if let Some(previous) = DeploymentVersion::load_from_file(&version_path)?
                && previous.plan_hash != fingerprint
            {
                tracing::warn!(
                    previous = %previous.plan_hash,
                    current = %fingerprint,
                    "Plan changed since the last deployment; steps already deployed are kept. \
                     Use --redeploy to deploy everything again"
                );
            }
            (plan.pending(&existing), existing.clone())
        };
        let reused = plan
            .steps()
            .iter()
            .filter(|s| !pending.contains(&s.name))
            .map(|s| s.name.clone())
            .collect::<Vec<_>>();
        if !reused.is_empty() {
            tracing::info!(steps = ?reused, "Already deployed, skipping");
        }

        let mut executor = DeploymentExecutor::new(ctx).with_registry(seed);
        if self.config.dependency_fallback {
            executor = executor.with_fallback(&externals);
        }

        if let Err(e) = executor.execute(&pending).await {
            if let Err(save_err) = executor.save(&book, tag) {
                tracing::error!(error = %save_err, "Failed to save partial deployments");
            }
            return Err(e.into());
        }
        executor.save(&book, tag)?;
        DeploymentVersion::new(fingerprint).save_to_file(&version_path)?;

        let deployed = executor.deployed().to_vec();

        let verification = match verifier {
            Some(verifier) if !deployed.is_empty() => {
                let verify = match options.verify {
                    Some(verify) => verify,
                    None => prompt
                        .confirm("Do you want to verify the contracts?")
                        .unwrap_or_else(|e| {
                            tracing::warn!(error = %e, "Prompt failed, skipping verification");
                            false
                        }),
                };
                match verifier {
                    _ if !verify => None,
                    Ok(verifier) => Some(executor.verify(&verifier).await),
                    Err(e) => {
                        let reason = format!("verifier unavailable: {e:#}");
                        tracing::warn!(error = %reason, "Skipping verification");
                        Some(VerificationReport::unavailable(&deployed, &reason))
                    }
                }
            }
            _ => None,
        };

        let batch = SetupBatch::collect(executor.registry(), &[&setup])?;
        let setup = execute_setup(ctx, &batch).await?;

        tracing::info!(
            deployed = deployed.len(),
            reused = reused.len(),
            "✓ Deployment complete!"
        );

        Ok(DeploymentSummary {
            chain_id,
            tag: tag.to_string(),
            signer,
            deployed,
            reused,
            registry: executor.into_registry(),
            verification,
            setup,
        })
    }

    /// Deployments recorded for the configured project and tag on `chain_id`.
    pub fn list(&self, chain_id: u64) -> Result<DeploymentRegistry> {
        self.address_book().load(&self.config.tag, chain_id)
    }
}
