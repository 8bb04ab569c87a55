//! Error taxonomy for planning, executing and configuring a deployment run.

use alloy_core::primitives::B256;

/// Errors surfaced by the deployment core.
///
/// Plan-construction variants are raised before any chain interaction. Execution variants abort the
/// run but leave the registry built so far intact, so it can be persisted and resumed.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// A step with this name already exists in the plan (or registry).
    #[error("duplicate step name: {0}")]
    DuplicateStepName(String),

    /// A dependency points outside the step's arguments or at a non-address argument.
    #[error("step {step} has a malformed dependency at argument {arg_position}: {reason}")]
    MalformedDependency {
        step: String,
        arg_position: usize,
        reason: String,
    },

    /// Adding the step would close a dependency cycle.
    #[error("dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// A referenced deployment has no known address when it is needed.
    #[error("{step} depends on {dependency}, which has no known address")]
    UnresolvedDependency { step: String, dependency: String },

    /// The dry-run of a deployment reverted.
    #[error("simulation of {step} failed: {cause:#}")]
    SimulationFailed {
        step: String,
        #[source]
        cause: anyhow::Error,
    },

    /// The deployment transaction failed or could not be confirmed.
    #[error("deployment of {step_name} failed: {cause:#}")]
    DeploymentFailed {
        step_name: String,
        #[source]
        cause: anyhow::Error,
    },

    /// The atomic batch of setup calls failed. Triggers the one-by-one fallback.
    #[error("aggregated setup batch failed: {0:#}")]
    BatchAggregationFailed(#[source] anyhow::Error),

    /// A setup call failed during the one-by-one fallback.
    ///
    /// `call_index` is the 1-based position of the call in the batch. `committed` holds the
    /// transactions of the calls that went through before it.
    #[error("setup call #{call_index} failed: {cause:#}")]
    SetupCallFailed {
        call_index: usize,
        committed: Vec<B256>,
        #[source]
        cause: anyhow::Error,
    },

    /// The deployment manifest is invalid.
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// Reading or writing the address book failed.
    #[error("address book error: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

impl DeployError {
    /// Returns true for errors raised while building the plan, before touching the chain.
    pub fn is_plan_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateStepName(_)
                | Self::MalformedDependency { .. }
                | Self::DependencyCycle(_)
                | Self::Manifest(_)
        )
    }
}
