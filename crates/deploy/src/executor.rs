//! Deployment executor: turns a [`DeploymentPlan`] into a [`DeploymentRegistry`].

use crate::{
    AddressBook, AddressSource, ArgValue, ChainClient, DeployContext, DeployError,
    DeploymentPlan, DeploymentRegistry, DeploymentStep, ResolvedDeployment, TxRequest,
    VerificationReport, Verifier, registry::NameQuery, verify_deployments,
};

/// Executes deployment steps one at a time, in plan order.
///
/// Every step is confirmed before the next one starts. The registry survives a failed run so the
/// caller can persist the progress made so far.
pub struct DeploymentExecutor<'a, C, A> {
    ctx: &'a DeployContext<C, A>,
    registry: DeploymentRegistry,
    /// Number of registry entries recorded before this executor ran.
    seeded: usize,
    fallback: Option<&'a (dyn AddressSource + Sync)>,
}

impl<'a, C: ChainClient, A> DeploymentExecutor<'a, C, A> {
    pub fn new(ctx: &'a DeployContext<C, A>) -> Self {
        Self {
            ctx,
            registry: DeploymentRegistry::new(),
            seeded: 0,
            fallback: None,
        }
    }

    /// Start from deployments recorded by a previous run.
    pub fn with_registry(mut self, registry: DeploymentRegistry) -> Self {
        self.seeded = registry.len();
        self.registry = registry;
        self
    }

    /// Consult `source` for dependencies that are missing from the registry.
    pub fn with_fallback(mut self, source: &'a (dyn AddressSource + Sync)) -> Self {
        self.fallback = Some(source);
        self
    }

    /// Execute every step of `plan`.
    ///
    /// Every dependency is checked before the first transaction: it must name an earlier step, a
    /// recorded deployment or, with a fallback, an address the fallback knows. Execution then
    /// stops at the first failing step. Steps already recorded in the registry are rejected with
    /// [`DeployError::DuplicateStepName`]; use [`DeploymentPlan::pending`] to resume a run.
    pub async fn execute(&mut self, plan: &DeploymentPlan) -> Result<(), DeployError> {
        self.check_dependencies(plan)?;

        tracing::info!(
            steps = plan.len(),
            confirmations = self.ctx.confirmations,
            "Executing deployment plan..."
        );

        for (index, step) in plan.steps().iter().enumerate() {
            tracing::info!(
                step = %step.name,
                artifact = %step.factory.name,
                position = index + 1,
                total = plan.len(),
                "Deploying..."
            );

            let deployment = self.execute_step(step).await?;

            tracing::info!(
                step = %deployment.name,
                address = %deployment.address,
                tx_hash = %deployment.tx_hash,
                "✓ Deployed"
            );
            self.registry.insert(deployment)?;
        }

        Ok(())
    }

    fn check_dependencies(&self, plan: &DeploymentPlan) -> Result<(), DeployError> {
        for (index, step) in plan.steps().iter().enumerate() {
            let earlier = &plan.steps()[..index];
            for dependency in step.dependencies() {
                let known = earlier.iter().any(|s| s.name == dependency)
                    || self.registry.contains(dependency)
                    || self.fallback.is_some_and(|source| {
                        source
                            .lookup(&NameQuery::Exact(dependency.to_string()))
                            .is_some()
                    });
                if !known {
                    return Err(DeployError::UnresolvedDependency {
                        step: step.name.clone(),
                        dependency: dependency.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn execute_step(&self, step: &DeploymentStep) -> Result<ResolvedDeployment, DeployError> {
        if self.registry.contains(&step.name) {
            return Err(DeployError::DuplicateStepName(step.name.clone()));
        }

        let args = self.resolve_args(step)?;

        if step.run_static_simulation {
            let request = TxRequest::create(step.factory.creation_code(&args));
            self.ctx
                .chain
                .simulate(&request)
                .await
                .map_err(|cause| DeployError::SimulationFailed {
                    step: step.name.clone(),
                    cause,
                })?;
            tracing::debug!(step = %step.name, "Static simulation succeeded");
        }

        let failed = |cause| DeployError::DeploymentFailed {
            step_name: step.name.clone(),
            cause,
        };

        let pending = self
            .ctx
            .chain
            .deploy(&step.factory, &args)
            .await
            .map_err(failed)?;

        tracing::debug!(
            step = %step.name,
            tx_hash = %pending.tx_hash,
            "Deployment submitted, waiting for confirmation"
        );

        self.ctx
            .chain
            .wait(pending.tx_hash, self.ctx.confirmations)
            .await
            .map_err(failed)?;

        Ok(ResolvedDeployment {
            name: step.name.clone(),
            address: pending.address,
            tx_hash: pending.tx_hash,
            artifact: step.factory.name.clone(),
            args,
        })
    }

    /// Replace every dependency placeholder with the dependency's address.
    fn resolve_args(&self, step: &DeploymentStep) -> Result<Vec<ArgValue>, DeployError> {
        let mut args = step.args.clone();

        for dependency in &step.depends_on {
            let name = &dependency.deployment_name;
            let address = match self.registry.address_of(name) {
                Some(address) => address,
                None => {
                    let fallback = self
                        .fallback
                        .and_then(|source| source.lookup(&NameQuery::Exact(name.clone())));
                    if let Some(address) = fallback {
                        tracing::warn!(
                            step = %step.name,
                            dependency = %name,
                            %address,
                            "Dependency missing from registry, using fallback address"
                        );
                    }
                    fallback.ok_or_else(|| DeployError::UnresolvedDependency {
                        step: step.name.clone(),
                        dependency: name.clone(),
                    })?
                }
            };

            let slot = args.get_mut(dependency.arg_position).ok_or_else(|| {
                DeployError::MalformedDependency {
                    step: step.name.clone(),
                    arg_position: dependency.arg_position,
                    reason: "argument position out of range".to_string(),
                }
            })?;
            *slot = ArgValue::Address(address);
        }

        Ok(args)
    }

    /// The deployments recorded so far, in execution order.
    pub fn list(&self) -> &[ResolvedDeployment] {
        self.registry.entries()
    }

    /// The deployments made by this executor, without the ones it was seeded with.
    pub fn deployed(&self) -> &[ResolvedDeployment] {
        &self.registry.entries()[self.seeded..]
    }

    pub fn registry(&self) -> &DeploymentRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> DeploymentRegistry {
        self.registry
    }

    /// Persist the registry under `tag` for the context's chain.
    pub fn save(&self, book: &impl AddressBook, tag: &str) -> Result<(), DeployError> {
        book.save(tag, self.ctx.chain_id, &self.registry)
            .map_err(DeployError::Persistence)?;
        tracing::info!(
            tag,
            chain_id = self.ctx.chain_id,
            deployments = self.registry.len(),
            "Deployments saved"
        );
        Ok(())
    }

    /// Submit the deployments made by this executor for verification.
    ///
    /// Failures are collected in the report and never retried.
    pub async fn verify<V: Verifier>(&self, verifier: &V) -> VerificationReport {
        verify_deployments(verifier, self.deployed()).await
    }
}
